//! Dual-source Northwind warehouse ETL.
//!
//! Reads the Northwind CSV export and the SQL Server CSV export, merges them
//! into four dimension tables, builds the sales and purchases facts, and
//! replaces the contents of the six warehouse tables.

pub mod columns;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod extract;
pub mod facts;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod warehouse;
