//! Error types for the warehouse ETL.

use thiserror::Error;

/// Failure reading a single source file. The extractor never propagates
/// this; it logs it and treats the table as absent.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("file has no header row")]
    MissingHeader,
}

/// A transformer could not produce its rows.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{source_name} table '{table}' has no column for {field} (expected one of: {candidates})")]
    UnresolvedColumn {
        source_name: &'static str,
        table: &'static str,
        field: &'static str,
        candidates: String,
    },

    #[error("warehouse error during reconciliation: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("placeholder backfill failed: {0}")]
    Backfill(#[from] LoadError),
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("duplicate key {key} in '{table}'")]
    DuplicateKey { table: String, key: i64 },

    #[error("'{table}.{column}' references missing key {key}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        key: i64,
    },

    #[error("'{table}.{column}' does not accept NULL")]
    NullViolation { table: String, column: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("row {row} has {found} values, table '{table}' expects {expected}")]
    Arity {
        table: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{table}.{column}' is {expected} but row {row} carries {found}")]
    TypeMismatch {
        table: &'static str,
        column: &'static str,
        row: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} in '{table}.{column}' is out of INTEGER range")]
    IntegerRange {
        table: &'static str,
        column: &'static str,
        value: i64,
    },

    #[error("row {row} has {length} characters in '{table}.{column}', which holds {width}")]
    TextLength {
        table: &'static str,
        column: &'static str,
        row: usize,
        width: u16,
        length: usize,
    },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Failures that end the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not prepare source directory {path}: {source}")]
    SourceDir {
        path: String,
        source: std::io::Error,
    },

    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] WarehouseError),

    #[error("clearing warehouse tables failed: {0}")]
    Clear(#[source] WarehouseError),

    #[error("dimension transformation failed: {0}")]
    Dimensions(#[from] TransformError),

    #[error("reading final row counts failed: {0}")]
    Summary(#[source] WarehouseError),
}
