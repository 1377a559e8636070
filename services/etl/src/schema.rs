//! Warehouse schema - the six star-schema tables, their storage types, and
//! the bootstrapper that (re)creates them.
//!
//! Each [`TableSpec`] is the single storage-type mapping for its table: DDL
//! is generated from it and the loader binds values (typed NULLs included)
//! from it.

use tracing::{info, warn};

use crate::error::WarehouseError;
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Decimal { precision: u8, scale: u8 },
    Float,
    Timestamp,
    Text(u16),
}

impl ColumnType {
    pub fn sql(self) -> String {
        match self {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            ColumnType::Float => "DOUBLE PRECISION".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Text(len) => format!("VARCHAR({})", len),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Decimal { .. } => "decimal",
            ColumnType::Float => "float",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text(_) => "text",
        }
    }
}

const MONEY: ColumnType = ColumnType::Decimal {
    precision: 18,
    scale: 4,
};
const NAME: ColumnType = ColumnType::Text(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub references: Option<ForeignKey>,
}

const fn column(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        nullable: true,
        primary_key: false,
        references: None,
    }
}

impl ColumnDef {
    const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    const fn primary_key(mut self) -> Self {
        self.nullable = false;
        self.primary_key = true;
        self
    }

    const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKey { table, column });
        self
    }
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// Database-generated surrogate key, never supplied by the loader.
    pub identity: Option<&'static str>,
    /// Loadable columns, in insert order.
    pub columns: &'static [ColumnDef],
}

impl TableSpec {
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

pub const DIM_PRODUCT_TABLE: &str = "dwh_dim_product";
pub const DIM_CUSTOMER_TABLE: &str = "dwh_dim_customer";
pub const DIM_EMPLOYEE_TABLE: &str = "dwh_dim_employee";
pub const DIM_SUPPLIER_TABLE: &str = "dwh_dim_supplier";
pub const SALES_FACT_TABLE: &str = "dwh_sales_fact";
pub const PURCHASES_FACT_TABLE: &str = "dwh_purchases_fact";

pub static DIM_PRODUCT: TableSpec = TableSpec {
    name: DIM_PRODUCT_TABLE,
    identity: None,
    columns: &[
        column("product_id", ColumnType::Integer).primary_key(),
        column("product_code", NAME),
        column("product_name", ColumnType::Text(100)),
        column("category", NAME),
        column("standard_cost", MONEY),
        column("list_price", MONEY),
        column("reorder_level", ColumnType::Integer),
    ],
};

pub static DIM_CUSTOMER: TableSpec = TableSpec {
    name: DIM_CUSTOMER_TABLE,
    identity: None,
    columns: &[
        column("customer_id", ColumnType::Integer).primary_key(),
        column("company", NAME),
        column("first_name", NAME),
        column("last_name", NAME),
        column("city", NAME),
        column("country_region", NAME),
    ],
};

pub static DIM_EMPLOYEE: TableSpec = TableSpec {
    name: DIM_EMPLOYEE_TABLE,
    identity: None,
    columns: &[
        column("employee_id", ColumnType::Integer).primary_key(),
        column("company", NAME),
        column("first_name", NAME),
        column("last_name", NAME),
        column("job_title", NAME),
    ],
};

pub static DIM_SUPPLIER: TableSpec = TableSpec {
    name: DIM_SUPPLIER_TABLE,
    identity: None,
    columns: &[
        column("supplier_id", ColumnType::Integer).primary_key(),
        column("company", NAME),
        column("first_name", NAME),
        column("last_name", NAME),
        column("city", NAME),
        column("country_region", NAME),
    ],
};

pub static SALES_FACT: TableSpec = TableSpec {
    name: SALES_FACT_TABLE,
    identity: Some("sales_key"),
    columns: &[
        column("order_date", ColumnType::Timestamp).not_null(),
        column("customer_key", ColumnType::Integer).references(DIM_CUSTOMER_TABLE, "customer_id"),
        column("employee_key", ColumnType::Integer).references(DIM_EMPLOYEE_TABLE, "employee_id"),
        column("product_key", ColumnType::Integer).references(DIM_PRODUCT_TABLE, "product_id"),
        column("quantity", ColumnType::Integer).not_null(),
        column("unit_price", MONEY).not_null(),
        column("discount", ColumnType::Float).not_null(),
        column("tax_rate", ColumnType::Float).not_null(),
        column("total_revenue", MONEY).not_null(),
        column("freight_cost", MONEY),
        column("order_status", NAME),
    ],
};

pub static PURCHASES_FACT: TableSpec = TableSpec {
    name: PURCHASES_FACT_TABLE,
    identity: Some("purchase_key"),
    columns: &[
        column("creation_date", ColumnType::Timestamp).not_null(),
        column("supplier_key", ColumnType::Integer).references(DIM_SUPPLIER_TABLE, "supplier_id"),
        column("employee_key", ColumnType::Integer).references(DIM_EMPLOYEE_TABLE, "employee_id"),
        column("product_key", ColumnType::Integer).references(DIM_PRODUCT_TABLE, "product_id"),
        column("quantity", ColumnType::Integer).not_null(),
        column("unit_cost", MONEY).not_null(),
        column("total_purchase_cost", MONEY).not_null(),
    ],
};

/// Creation order: dimensions before the facts that reference them.
pub static ALL_TABLES: [&TableSpec; 6] = [
    &DIM_PRODUCT,
    &DIM_CUSTOMER,
    &DIM_SUPPLIER,
    &DIM_EMPLOYEE,
    &SALES_FACT,
    &PURCHASES_FACT,
];

/// Deletion order: facts first.
pub const CLEAR_ORDER: [&str; 6] = [
    SALES_FACT_TABLE,
    PURCHASES_FACT_TABLE,
    DIM_PRODUCT_TABLE,
    DIM_CUSTOMER_TABLE,
    DIM_EMPLOYEE_TABLE,
    DIM_SUPPLIER_TABLE,
];

/// The four dimension types facts point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Product,
    Customer,
    Employee,
    Supplier,
}

impl Dimension {
    pub fn spec(self) -> &'static TableSpec {
        match self {
            Dimension::Product => &DIM_PRODUCT,
            Dimension::Customer => &DIM_CUSTOMER,
            Dimension::Employee => &DIM_EMPLOYEE,
            Dimension::Supplier => &DIM_SUPPLIER,
        }
    }

    pub fn table(self) -> &'static str {
        self.spec().name
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Dimension::Product => "product_id",
            Dimension::Customer => "customer_id",
            Dimension::Employee => "employee_id",
            Dimension::Supplier => "supplier_id",
        }
    }
}

pub fn create_table_sql(spec: &TableSpec) -> String {
    let mut lines = Vec::new();
    if let Some(identity) = spec.identity {
        lines.push(format!("    {} INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY", identity));
    }
    for c in spec.columns {
        let mut line = format!("    {} {}", c.name, c.ty.sql());
        if c.primary_key {
            line.push_str(" PRIMARY KEY");
        } else if !c.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(fk) = c.references {
            line.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        }
        lines.push(line);
    }
    format!("CREATE TABLE {} (\n{}\n)", spec.name, lines.join(",\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    AlreadyPresent,
    Recreated { found: usize },
}

/// Make sure all six tables exist. If any is missing, every one of them is
/// dropped and recreated; an existing complete schema is never touched.
pub async fn ensure_schema<W: Warehouse>(warehouse: &W) -> Result<SchemaStatus, WarehouseError> {
    let names: Vec<&'static str> = ALL_TABLES.iter().map(|t| t.name).collect();
    let found = warehouse.count_existing_tables(&names).await?;

    if found >= ALL_TABLES.len() {
        info!(tables = found, "all warehouse tables already exist");
        return Ok(SchemaStatus::AlreadyPresent);
    }

    warn!(found, expected = ALL_TABLES.len(), "warehouse schema incomplete, recreating");

    for table in CLEAR_ORDER {
        warehouse.drop_table(table).await?;
    }
    for spec in ALL_TABLES {
        warehouse.create_table(spec).await?;
    }

    info!("warehouse tables created");
    Ok(SchemaStatus::Recreated { found })
}

/// Delete every row of the six tables, facts first. Returns the total
/// number of rows removed.
pub async fn clear_all<W: Warehouse>(warehouse: &W) -> Result<u64, WarehouseError> {
    let mut total = 0;
    for table in CLEAR_ORDER {
        let deleted = warehouse.clear_table(table).await?;
        if deleted > 0 {
            info!(table, deleted, "cleared");
        }
        total += deleted;
    }
    info!(total, "all warehouse tables cleared");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;

    #[test]
    fn test_create_sales_fact_sql() {
        let sql = create_table_sql(&SALES_FACT);
        assert!(sql.starts_with("CREATE TABLE dwh_sales_fact ("));
        assert!(sql.contains("sales_key INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY"));
        assert!(sql.contains("order_date TIMESTAMP NOT NULL"));
        assert!(sql.contains("customer_key INTEGER REFERENCES dwh_dim_customer(customer_id)"));
        assert!(sql.contains("employee_key INTEGER REFERENCES dwh_dim_employee(employee_id)"));
        assert!(sql.contains("product_key INTEGER REFERENCES dwh_dim_product(product_id)"));
        assert!(sql.contains("unit_price NUMERIC(18,4) NOT NULL"));
        assert!(sql.contains("discount DOUBLE PRECISION NOT NULL"));
        assert!(sql.contains("order_status VARCHAR(50)"));
    }

    #[test]
    fn test_create_dimension_sql() {
        let sql = create_table_sql(&DIM_PRODUCT);
        assert!(sql.contains("product_id INTEGER PRIMARY KEY"));
        assert!(sql.contains("product_name VARCHAR(100)"));
        assert!(!sql.contains("IDENTITY"));
    }

    #[test]
    fn test_purchases_fact_references_three_dimensions() {
        let fks: Vec<&str> = PURCHASES_FACT
            .columns
            .iter()
            .filter_map(|c| c.references.map(|fk| fk.table))
            .collect();
        assert_eq!(fks, vec![DIM_SUPPLIER_TABLE, DIM_EMPLOYEE_TABLE, DIM_PRODUCT_TABLE]);
    }

    #[test]
    fn test_dimension_tables_created_before_facts() {
        let fact_pos = ALL_TABLES.iter().position(|t| t.identity.is_some()).unwrap();
        assert!(ALL_TABLES[..fact_pos].iter().all(|t| t.identity.is_none()));
        assert!(ALL_TABLES[fact_pos..].iter().all(|t| t.identity.is_some()));
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_when_empty() {
        let w = MemoryWarehouse::new();
        let status = ensure_schema(&w).await.unwrap();
        assert_eq!(status, SchemaStatus::Recreated { found: 0 });
        assert_eq!(w.table_names().len(), 6);
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        let ops_after_first = w.schema_operations();

        let status = ensure_schema(&w).await.unwrap();
        assert_eq!(status, SchemaStatus::AlreadyPresent);
        assert_eq!(w.schema_operations(), ops_after_first);
    }

    #[tokio::test]
    async fn test_ensure_schema_resets_partial_schema() {
        let w = MemoryWarehouse::new();
        w.create_table(&DIM_PRODUCT).await.unwrap();
        w.create_table(&DIM_CUSTOMER).await.unwrap();

        let status = ensure_schema(&w).await.unwrap();
        assert_eq!(status, SchemaStatus::Recreated { found: 2 });
        assert_eq!(w.table_names().len(), 6);
    }

    #[tokio::test]
    async fn test_clear_all_empties_every_table() {
        use crate::warehouse::Cell;

        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        w.insert_batch(
            &DIM_EMPLOYEE,
            &[vec![
                Cell::Int(Some(1)),
                Cell::Text(Some("Northwind Traders".into())),
                Cell::Text(Some("Nancy".into())),
                Cell::Text(Some("Freehafer".into())),
                Cell::Text(Some("Sales Representative".into())),
            ]],
        )
        .await
        .unwrap();

        let deleted = clear_all(&w).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(w.count_rows(DIM_EMPLOYEE_TABLE).await.unwrap(), 0);
    }
}
