//! The warehouse store the pipeline writes into.
//!
//! Higher layers (bootstrapper, reconciler, loader, pipeline) depend on the
//! [`Warehouse`] trait, not on a concrete backend.

mod memory;
mod postgres;

use std::collections::BTreeSet;
use std::future::Future;

use chrono::NaiveDateTime;

use crate::error::WarehouseError;
use crate::schema::TableSpec;

pub use memory::MemoryWarehouse;
pub use postgres::PgWarehouse;

/// A value ready to bind, already narrowed to its column's storage type.
/// Decimal columns travel as `Float`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(Option<i32>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Int(v) => v.is_none(),
            Cell::Float(v) => v.is_none(),
            Cell::Text(v) => v.is_none(),
            Cell::Timestamp(v) => v.is_none(),
        }
    }

    pub fn as_key(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => v.map(i64::from),
            _ => None,
        }
    }
}

/// Abstraction over the warehouse backend.
///
/// All methods return `Send` futures so the trait can be driven from a
/// multi-threaded tokio runtime.
pub trait Warehouse: Send + Sync {
    /// How many of `tables` currently exist.
    fn count_existing_tables(
        &self,
        tables: &[&'static str],
    ) -> impl Future<Output = Result<usize, WarehouseError>> + Send;

    /// Drop a table; a table that does not exist is not an error.
    fn drop_table(&self, table: &'static str) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    fn create_table(&self, spec: &'static TableSpec) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    /// Delete all rows, returning how many were removed.
    fn clear_table(&self, table: &'static str) -> impl Future<Output = Result<u64, WarehouseError>> + Send;

    /// Append one batch of rows laid out in `spec.columns` order.
    fn insert_batch(
        &self,
        spec: &'static TableSpec,
        rows: &[Vec<Cell>],
    ) -> impl Future<Output = Result<u64, WarehouseError>> + Send;

    fn count_rows(&self, table: &'static str) -> impl Future<Output = Result<i64, WarehouseError>> + Send;

    /// Every non-null value of an integer key column.
    fn fetch_keys(
        &self,
        table: &'static str,
        key_column: &'static str,
    ) -> impl Future<Output = Result<BTreeSet<i64>, WarehouseError>> + Send;
}
