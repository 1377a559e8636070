//! Run orchestrator: bootstrap, clear, extract, merge, load dimensions,
//! then build and load the two fact tables.
//!
//! Schema, clear and dimension failures end the run. A fact transformer or
//! table load that fails is logged and tallied, and the run moves on.

use std::error::Error;

use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::dimensions::merge_dimensions;
use crate::error::{PipelineError, TransformError};
use crate::extract::{Extractor, Source, NORTHWIND_TABLES, SQLSERVER_TABLES};
use crate::facts::purchases::prepare_purchases;
use crate::facts::sales::prepare_sales;
use crate::load::{load_table, LoadOutcome};
use crate::model::WarehouseRow;
use crate::query::{table_counts, SalesAnalytics, TableCount};
use crate::schema::{clear_all, ensure_schema};
use crate::warehouse::Warehouse;

/// Per-table load results for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    fn record(&mut self, table: &str, outcome: Result<LoadOutcome, &(dyn Error + 'static)>) {
        match outcome {
            Ok(LoadOutcome::Loaded { .. }) => self.loaded += 1,
            Ok(LoadOutcome::Skipped) => self.skipped += 1,
            Err(e) => {
                error!(table, error = e, "table load failed");
                self.failed += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub tally: Tally,
    pub tables: Vec<TableCount>,
    /// Figures over the sales rows that were loaded.
    pub sales: SalesAnalytics,
}

/// Create the Northwind root if it is missing; only warn about a missing
/// SQL Server root.
pub async fn check_source_dirs(config: &Config) -> Result<(), PipelineError> {
    if !fs::try_exists(&config.northwind_dir).await.unwrap_or(false) {
        warn!(path = %config.northwind_dir.display(), "northwind directory not found, creating it");
        fs::create_dir_all(&config.northwind_dir)
            .await
            .map_err(|source| PipelineError::SourceDir {
                path: config.northwind_dir.display().to_string(),
                source,
            })?;
    }

    if fs::try_exists(&config.sqlserver_dir).await.unwrap_or(false) {
        info!(path = %config.sqlserver_dir.display(), "sqlserver directory found");
    } else {
        warn!(path = %config.sqlserver_dir.display(), "sqlserver directory not found, check the path");
    }
    Ok(())
}

async fn load_into<W: Warehouse, R: WarehouseRow>(
    warehouse: &W,
    tally: &mut Tally,
    rows: &[R],
    batch_size: usize,
) -> Option<LoadOutcome> {
    let outcome = load_table(warehouse, rows, batch_size).await;
    match &outcome {
        Ok(loaded) => tally.record(R::spec().name, Ok(*loaded)),
        Err(e) => tally.record(R::spec().name, Err(e)),
    }
    outcome.ok()
}

/// Load fact rows a transformer produced, or tally its failure.
async fn load_facts<W: Warehouse, R: WarehouseRow>(
    warehouse: &W,
    tally: &mut Tally,
    prepared: Result<Vec<R>, TransformError>,
    batch_size: usize,
) -> Option<Vec<R>> {
    match prepared {
        Ok(rows) => match load_into(warehouse, tally, &rows, batch_size).await {
            Some(LoadOutcome::Loaded { .. }) => Some(rows),
            _ => None,
        },
        Err(e) => {
            tally.record(R::spec().name, Err(&e));
            None
        }
    }
}

/// Execute one full replace of the warehouse.
pub async fn run<W: Warehouse>(warehouse: &W, config: &Config) -> Result<RunSummary, PipelineError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("etl_run", %run_id);
    execute(warehouse, config, run_id).instrument(span).await
}

async fn execute<W: Warehouse>(warehouse: &W, config: &Config, run_id: Uuid) -> Result<RunSummary, PipelineError> {
    info!("starting dual-source warehouse load");
    check_source_dirs(config).await?;

    ensure_schema(warehouse).await.map_err(PipelineError::Schema)?;
    clear_all(warehouse).await.map_err(PipelineError::Clear)?;

    let extractor = Extractor::new(config);
    let sqlserver = extractor.extract_all(Source::SqlServer, SQLSERVER_TABLES).await;
    let northwind = extractor.extract_all(Source::Northwind, NORTHWIND_TABLES).await;

    let dims = merge_dimensions(&northwind, &sqlserver)?;
    let batch = config.batch_size;
    let mut tally = Tally::default();

    load_into(warehouse, &mut tally, &dims.products, batch).await;
    load_into(warehouse, &mut tally, &dims.customers, batch).await;
    load_into(warehouse, &mut tally, &dims.employees, batch).await;
    load_into(warehouse, &mut tally, &dims.suppliers, batch).await;

    let sales = prepare_sales(warehouse, &northwind, &sqlserver, batch).await;
    let loaded_sales = load_facts(warehouse, &mut tally, sales, batch).await;

    let purchases = prepare_purchases(warehouse, &northwind, batch).await;
    load_facts(warehouse, &mut tally, purchases, batch).await;

    info!(
        loaded = tally.loaded,
        failed = tally.failed,
        skipped = tally.skipped,
        "etl complete"
    );

    let tables = table_counts(warehouse).await.map_err(PipelineError::Summary)?;
    let sales = loaded_sales
        .as_deref()
        .map(SalesAnalytics::from_facts)
        .unwrap_or_default();

    Ok(RunSummary {
        run_id,
        tally,
        tables,
        sales,
    })
}

/// Print the end-of-run report.
pub fn log_summary(summary: &RunSummary) {
    for t in &summary.tables {
        info!(table = t.table, rows = t.rows, "final row count");
    }
    let s = &summary.sales;
    info!(
        total_orders = s.total_orders,
        total_revenue = format!("{:.2}", s.total_revenue),
        avg_revenue = format!("{:.2}", s.avg_revenue),
        taxed_orders = s.taxed_orders,
        "sales analytics"
    );
}
