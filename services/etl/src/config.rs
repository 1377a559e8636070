//! Run configuration, read from the environment (after `.env`) and
//! overridable from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use encoding_rs::Encoding;

pub const DEFAULT_NORTHWIND_DIR: &str = "data/northwind";
pub const DEFAULT_SQLSERVER_DIR: &str = "data/sqlserver/csv";
pub const DEFAULT_ENCODING: &str = "windows-1252";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Only required when loading for real.
    pub db_url: Option<String>,
    pub northwind_dir: PathBuf,
    pub sqlserver_dir: PathBuf,
    pub encoding: &'static Encoding,
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let label = std::env::var("SOURCE_ENCODING").unwrap_or_else(|_| DEFAULT_ENCODING.to_string());
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .with_context(|| format!("SOURCE_ENCODING '{}' is not a known encoding label", label))?;

        let batch_size = match std::env::var("LOAD_BATCH_SIZE") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("LOAD_BATCH_SIZE '{}' is not a number", raw))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            db_url: std::env::var("DB_URL").ok(),
            northwind_dir: PathBuf::from(
                std::env::var("NORTHWIND_DIR").unwrap_or_else(|_| DEFAULT_NORTHWIND_DIR.to_string()),
            ),
            sqlserver_dir: PathBuf::from(
                std::env::var("SQLSERVER_DIR").unwrap_or_else(|_| DEFAULT_SQLSERVER_DIR.to_string()),
            ),
            encoding,
            batch_size: batch_size.max(1),
        })
    }

    /// Config pointing at two explicit roots with default encoding and batch
    /// size. Used by tests and the dry-run path.
    pub fn with_roots(northwind_dir: impl Into<PathBuf>, sqlserver_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_url: None,
            northwind_dir: northwind_dir.into(),
            sqlserver_dir: sqlserver_dir.into(),
            encoding: encoding_rs::WINDOWS_1252,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}
