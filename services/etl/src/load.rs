//! Loader - appends prepared rows to a warehouse table in fixed-size
//! batches, then re-counts the table as confirmation.

use tracing::{debug, info};

use crate::error::LoadError;
use crate::model::{Value, WarehouseRow};
use crate::schema::{ColumnType, TableSpec};
use crate::warehouse::{Cell, Warehouse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `inserted` rows appended; the table now holds `total`.
    Loaded { inserted: u64, total: i64 },
    /// Nothing to load.
    Skipped,
}

/// Narrow one row's values to the storage types declared by `spec`.
pub fn to_cells(spec: &'static TableSpec, row: usize, values: Vec<Value>) -> Result<Vec<Cell>, LoadError> {
    if values.len() != spec.columns.len() {
        return Err(LoadError::Arity {
            table: spec.name,
            row,
            expected: spec.columns.len(),
            found: values.len(),
        });
    }

    spec.columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            let cell = match (column.ty, value) {
                (ColumnType::Integer, Value::Int(v)) => Cell::Int(match v {
                    Some(v) => Some(i32::try_from(v).map_err(|_| LoadError::IntegerRange {
                        table: spec.name,
                        column: column.name,
                        value: v,
                    })?),
                    None => None,
                }),
                (ColumnType::Decimal { .. } | ColumnType::Float, Value::Float(v)) => Cell::Float(v),
                (ColumnType::Decimal { .. } | ColumnType::Float, Value::Int(v)) => Cell::Float(v.map(|v| v as f64)),
                (ColumnType::Text(width), Value::Text(v)) => {
                    if let Some(text) = &v {
                        let length = text.chars().count();
                        if length > usize::from(width) {
                            return Err(LoadError::TextLength {
                                table: spec.name,
                                column: column.name,
                                row,
                                width,
                                length,
                            });
                        }
                    }
                    Cell::Text(v)
                }
                (ColumnType::Timestamp, Value::Timestamp(v)) => Cell::Timestamp(v),
                (ty, value) => {
                    return Err(LoadError::TypeMismatch {
                        table: spec.name,
                        column: column.name,
                        row,
                        expected: ty.name(),
                        found: value.kind(),
                    })
                }
            };
            Ok(cell)
        })
        .collect()
}

/// Append `rows` to their table. An empty input is not an error; it is
/// reported as [`LoadOutcome::Skipped`].
pub async fn load_table<W: Warehouse, R: WarehouseRow>(
    warehouse: &W,
    rows: &[R],
    batch_size: usize,
) -> Result<LoadOutcome, LoadError> {
    let spec = R::spec();
    if rows.is_empty() {
        info!(table = spec.name, "nothing to load, skipping");
        return Ok(LoadOutcome::Skipped);
    }

    info!(table = spec.name, rows = rows.len(), "loading");
    if let Ok(sample) = serde_json::to_string(&rows[0]) {
        debug!(table = spec.name, sample = %sample, "sample row");
    }

    let cells = rows
        .iter()
        .enumerate()
        .map(|(i, r)| to_cells(spec, i, r.values()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut inserted = 0;
    for batch in cells.chunks(batch_size.max(1)) {
        inserted += warehouse.insert_batch(spec, batch).await?;
    }

    let total = warehouse.count_rows(spec.name).await?;
    info!(table = spec.name, inserted, total, "load confirmed");
    Ok(LoadOutcome::Loaded { inserted, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomerRow, EmployeeRow};
    use crate::schema::{ensure_schema, DIM_CUSTOMER, DIM_CUSTOMER_TABLE, DIM_EMPLOYEE, DIM_EMPLOYEE_TABLE};
    use crate::warehouse::MemoryWarehouse;

    fn customer(id: i64) -> CustomerRow {
        CustomerRow {
            customer_id: id,
            company: Some(format!("Company {}", id)),
            first_name: None,
            last_name: None,
            city: Some("Seattle".into()),
            country_region: Some("USA".into()),
        }
    }

    #[test]
    fn test_to_cells_types_nulls_by_column() {
        let cells = to_cells(
            &DIM_EMPLOYEE,
            0,
            vec![
                Value::Int(Some(3)),
                Value::Text(None),
                Value::Text(Some("Jan".into())),
                Value::Text(Some("Kotas".into())),
                Value::Text(None),
            ],
        )
        .unwrap();
        assert_eq!(cells[0], Cell::Int(Some(3)));
        assert_eq!(cells[1], Cell::Text(None));
    }

    #[test]
    fn test_to_cells_rejects_type_mismatch() {
        let err = to_cells(
            &DIM_EMPLOYEE,
            4,
            vec![
                Value::Text(Some("three".into())),
                Value::Text(None),
                Value::Text(None),
                Value::Text(None),
                Value::Text(None),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::TypeMismatch { row: 4, column: "employee_id", .. }));
    }

    #[test]
    fn test_to_cells_rejects_integer_overflow() {
        let mut values = EmployeeRow::placeholder(1, "Unknown").values();
        values[0] = Value::Int(Some(i64::from(i32::MAX) + 1));
        let err = to_cells(&DIM_EMPLOYEE, 0, values).unwrap_err();
        assert!(matches!(err, LoadError::IntegerRange { .. }));
    }

    #[test]
    fn test_to_cells_rejects_text_wider_than_column() {
        let mut row = customer(1);
        row.company = Some("x".repeat(80));
        let err = to_cells(&DIM_CUSTOMER, 2, row.values()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TextLength { column: "company", row: 2, width: 50, length: 80, .. }
        ));

        row.company = Some("é".repeat(50));
        assert!(to_cells(&DIM_CUSTOMER, 0, row.values()).is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_load_rejects_overlong_text() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        let mut row = customer(1);
        row.city = Some("c".repeat(51));
        assert!(matches!(
            load_table(&w, &[row], 1000).await.unwrap_err(),
            LoadError::TextLength { .. }
        ));
        assert_eq!(w.count_rows(DIM_CUSTOMER_TABLE).await.unwrap(), 0);
    }

    #[test]
    fn test_to_cells_rejects_wrong_arity() {
        let err = to_cells(&DIM_EMPLOYEE, 0, vec![Value::Int(Some(1))]).unwrap_err();
        assert!(matches!(err, LoadError::Arity { expected: 5, found: 1, .. }));
    }

    #[tokio::test]
    async fn test_load_empty_is_skipped() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        let rows: Vec<CustomerRow> = Vec::new();
        assert_eq!(load_table(&w, &rows, 1000).await.unwrap(), LoadOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_load_in_batches_and_confirms_count() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        let rows: Vec<CustomerRow> = (1..=25).map(customer).collect();

        let outcome = load_table(&w, &rows, 10).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { inserted: 25, total: 25 });
    }

    #[tokio::test]
    async fn test_load_appends() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        load_table(&w, &[EmployeeRow::placeholder(1, "Unknown")], 1000).await.unwrap();

        let outcome = load_table(&w, &[EmployeeRow::placeholder(2, "Unknown")], 1000).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { inserted: 1, total: 2 });
        assert_eq!(w.rows(DIM_EMPLOYEE_TABLE).len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        let rows = vec![customer(1), customer(1)];
        assert!(matches!(
            load_table(&w, &rows, 1000).await.unwrap_err(),
            LoadError::Warehouse(_)
        ));
    }
}
