//! ETL Service - rebuilds the Northwind warehouse from both CSV exports
//!
//! Usage:
//!   etl [--northwind-dir DIR] [--sqlserver-dir DIR] [--batch-size N] [--dry-run]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use etl::config::Config;
use etl::pipeline::{log_summary, run};
use etl::warehouse::{MemoryWarehouse, PgWarehouse};

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Merges the Northwind and SQL Server exports into the warehouse")]
struct Args {
    /// Northwind CSV directory (overrides NORTHWIND_DIR)
    #[arg(long)]
    northwind_dir: Option<PathBuf>,

    /// SQL Server CSV directory (overrides SQLSERVER_DIR)
    #[arg(long)]
    sqlserver_dir: Option<PathBuf>,

    /// Rows per INSERT batch (overrides LOAD_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Dry run - run against an in-memory warehouse, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Skip the final row counts and sales analytics
    #[arg(long, default_value = "false")]
    skip_summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = args.northwind_dir {
        config.northwind_dir = dir;
    }
    if let Some(dir) = args.sqlserver_dir {
        config.sqlserver_dir = dir;
    }
    if let Some(n) = args.batch_size {
        config.batch_size = n.max(1);
    }

    info!(
        northwind = %config.northwind_dir.display(),
        sqlserver = %config.sqlserver_dir.display(),
        mode = if args.dry_run { "dry-run" } else { "live" },
        "northwind warehouse etl"
    );

    let summary = if args.dry_run {
        let warehouse = MemoryWarehouse::new();
        run(&warehouse, &config).await?
    } else {
        let warehouse = PgWarehouse::connect(config.db_url()?)
            .await
            .context("Failed to connect to database")?;
        let result = run(&warehouse, &config).await;
        warehouse.close().await;
        result?
    };

    if !args.skip_summary {
        log_summary(&summary);
    }
    info!(run_id = %summary.run_id, "etl process completed");
    Ok(())
}
