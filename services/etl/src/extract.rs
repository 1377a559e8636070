//! Extractor - reads the two CSV exports into loosely typed tables.
//!
//! Column presence is never assumed here. Downstream code resolves the
//! columns it needs through [`crate::columns`], falling back to alternate
//! names or defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ExtractError;

/// The two source ecosystems being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The 20-table legacy export. Its keys are kept as-is.
    Northwind,
    /// The 13-table relational export. Its keys are offset on merge.
    SqlServer,
}

impl Source {
    pub fn tag(self) -> &'static str {
        match self {
            Source::Northwind => "northwind",
            Source::SqlServer => "sqlserver",
        }
    }
}

/// Tables of the legacy export that the warehouse consumes.
pub const NORTHWIND_TABLES: &[&str] = &[
    "Products",
    "Customers",
    "Employees",
    "Suppliers",
    "Orders",
    "Order Details",
    "Orders Status",
    "Purchase Orders",
    "Purchase Order Details",
];

/// All thirteen tables of the relational export.
pub const SQLSERVER_TABLES: &[&str] = &[
    "Categories",
    "CustomerCustomerDemo",
    "CustomerDemographics",
    "Customers",
    "Employees",
    "EmployeeTerritories",
    "Order Details",
    "Orders",
    "Products",
    "Region",
    "Shippers",
    "Suppliers",
    "Territories",
];

/// A CSV file as read from disk: trimmed header names and raw cell text.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    /// Parse CSV text. Rows may be shorter than the header; missing cells
    /// read as empty.
    pub fn from_csv(name: &str, content: &str) -> Result<Self, ExtractError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ExtractError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    /// Index of the column with exactly this header.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct Extractor<'a> {
    config: &'a Config,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn path(&self, source: Source, table: &str) -> PathBuf {
        let root = match source {
            Source::Northwind => &self.config.northwind_dir,
            Source::SqlServer => &self.config.sqlserver_dir,
        };
        root.join(format!("{}.csv", table))
    }

    /// Read `<table>.csv` from the source's root. Any failure is logged and
    /// reported as `None`.
    pub async fn extract(&self, source: Source, table: &str) -> Option<SourceTable> {
        let path = self.path(source, table);
        match self.read(&path, table).await {
            Ok(parsed) => {
                info!(source = source.tag(), file = %path.display(), rows = parsed.len(), "extracted");
                Some(parsed)
            }
            Err(e) => {
                warn!(source = source.tag(), file = %path.display(), error = %e, "could not read source file");
                None
            }
        }
    }

    async fn read(&self, path: &std::path::Path, table: &str) -> Result<SourceTable, ExtractError> {
        let bytes = fs::read(path).await?;
        let (content, _, _) = self.config.encoding.decode(&bytes);
        SourceTable::from_csv(table, &content)
    }

    /// Extract every listed table of one source, skipping the missing ones.
    pub async fn extract_all(&self, source: Source, tables: &[&str]) -> SourceSet {
        let mut set = SourceSet::new(source);
        for table in tables {
            if let Some(parsed) = self.extract(source, table).await {
                set.insert(parsed);
            }
        }
        info!(source = source.tag(), loaded = set.len(), requested = tables.len(), "source extracted");
        set
    }
}

/// The tables successfully read from one source, by table name.
#[derive(Debug, Clone)]
pub struct SourceSet {
    pub source: Source,
    tables: HashMap<String, SourceTable>,
}

impl SourceSet {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            tables: HashMap::new(),
        }
    }

    pub fn insert(&mut self, table: SourceTable) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&SourceTable> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
