//! [`MemoryWarehouse`] - an in-process warehouse for dry runs and tests.
//!
//! It enforces the key and nullability constraints the real schema declares:
//! primary-key uniqueness, NOT NULL and foreign-key existence. Column types
//! and VARCHAR widths are checked earlier, when the loader narrows values.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{Cell, Warehouse};
use crate::error::WarehouseError;
use crate::schema::TableSpec;

#[derive(Debug)]
struct MemoryTable {
    spec: &'static TableSpec,
    rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<&'static str, MemoryTable>,
    schema_operations: usize,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.lock().tables.keys().copied().collect()
    }

    /// Number of drop/create statements executed so far.
    pub fn schema_operations(&self) -> usize {
        self.lock().schema_operations
    }

    /// Snapshot of a table's rows, in insert order.
    pub fn rows(&self, table: &str) -> Vec<Vec<Cell>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn table<'s>(state: &'s State, table: &str) -> Result<&'s MemoryTable, WarehouseError> {
        state
            .tables
            .get(table)
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))
    }

    fn key_set(state: &State, table: &str, column: &str) -> Result<BTreeSet<i64>, WarehouseError> {
        let t = Self::table(state, table)?;
        let idx = t
            .spec
            .column_index(column)
            .ok_or_else(|| WarehouseError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;
        Ok(t.rows.iter().filter_map(|r| r.get(idx).and_then(Cell::as_key)).collect())
    }

    /// Check a batch against the table's constraints before any row is
    /// written, so a rejected batch leaves the table unchanged.
    fn validate(state: &State, spec: &'static TableSpec, rows: &[Vec<Cell>]) -> Result<(), WarehouseError> {
        let mut primary = match spec.primary_key() {
            Some(pk) => Some((
                spec.column_index(pk.name).unwrap_or_default(),
                Self::key_set(state, spec.name, pk.name)?,
            )),
            None => None,
        };

        let mut parents = Vec::new();
        for (idx, column) in spec.columns.iter().enumerate() {
            if let Some(fk) = column.references {
                parents.push((idx, column.name, Self::key_set(state, fk.table, fk.column)?));
            }
        }

        for row in rows {
            for (idx, column) in spec.columns.iter().enumerate() {
                let null = row.get(idx).map_or(true, Cell::is_null);
                if null && !column.nullable {
                    return Err(WarehouseError::NullViolation {
                        table: spec.name.to_string(),
                        column: column.name.to_string(),
                    });
                }
            }

            if let Some((idx, seen)) = primary.as_mut() {
                if let Some(key) = row.get(*idx).and_then(Cell::as_key) {
                    if !seen.insert(key) {
                        return Err(WarehouseError::DuplicateKey {
                            table: spec.name.to_string(),
                            key,
                        });
                    }
                }
            }

            for (idx, column, keys) in &parents {
                if let Some(key) = row.get(*idx).and_then(Cell::as_key) {
                    if !keys.contains(&key) {
                        return Err(WarehouseError::ForeignKeyViolation {
                            table: spec.name.to_string(),
                            column: column.to_string(),
                            key,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Warehouse for MemoryWarehouse {
    async fn count_existing_tables(&self, tables: &[&'static str]) -> Result<usize, WarehouseError> {
        let state = self.lock();
        Ok(tables.iter().filter(|t| state.tables.contains_key(*t)).count())
    }

    async fn drop_table(&self, table: &'static str) -> Result<(), WarehouseError> {
        let mut state = self.lock();
        state.schema_operations += 1;
        state.tables.remove(table);
        Ok(())
    }

    async fn create_table(&self, spec: &'static TableSpec) -> Result<(), WarehouseError> {
        let mut state = self.lock();
        state.schema_operations += 1;
        state.tables.insert(spec.name, MemoryTable { spec, rows: Vec::new() });
        Ok(())
    }

    async fn clear_table(&self, table: &'static str) -> Result<u64, WarehouseError> {
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))?;
        let deleted = t.rows.len() as u64;
        t.rows.clear();
        Ok(deleted)
    }

    async fn insert_batch(&self, spec: &'static TableSpec, rows: &[Vec<Cell>]) -> Result<u64, WarehouseError> {
        let mut state = self.lock();
        Self::validate(&state, spec, rows)?;
        let t = state
            .tables
            .get_mut(spec.name)
            .ok_or_else(|| WarehouseError::UnknownTable(spec.name.to_string()))?;
        t.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn count_rows(&self, table: &'static str) -> Result<i64, WarehouseError> {
        let state = self.lock();
        Ok(Self::table(&state, table)?.rows.len() as i64)
    }

    async fn fetch_keys(&self, table: &'static str, key_column: &'static str) -> Result<BTreeSet<i64>, WarehouseError> {
        let state = self.lock();
        Self::key_set(&state, table, key_column)
    }
}
