//! [`PgWarehouse`] - the PostgreSQL implementation of [`Warehouse`].

use std::collections::BTreeSet;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{Cell, Warehouse};
use crate::error::WarehouseError;
use crate::schema::{create_table_sql, TableSpec};

/// A warehouse handle owning its connection pool for the length of a run.
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub async fn connect(db_url: &str) -> Result<Self, WarehouseError> {
        // The run is strictly sequential; one connection is all it uses.
        let pool = PgPoolOptions::new().max_connections(1).connect(db_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Release every connection. Called once the run is over.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

impl Warehouse for PgWarehouse {
    async fn count_existing_tables(&self, tables: &[&'static str]) -> Result<usize, WarehouseError> {
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_name = ANY($1)
            "#,
        )
        .bind(names)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn drop_table(&self, table: &'static str) -> Result<(), WarehouseError> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_table(&self, spec: &'static TableSpec) -> Result<(), WarehouseError> {
        let ddl = create_table_sql(spec);
        debug!(table = spec.name, ddl = %ddl, "creating table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_table(&self, table: &'static str) -> Result<u64, WarehouseError> {
        let result = sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_batch(&self, spec: &'static TableSpec, rows: &[Vec<Cell>]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            spec.name,
            spec.column_names().join(", ")
        ));
        qb.push_values(rows.iter(), |mut b, row| {
            for cell in row {
                match cell {
                    Cell::Int(v) => b.push_bind(*v),
                    Cell::Float(v) => b.push_bind(*v),
                    Cell::Text(v) => b.push_bind(v.clone()),
                    Cell::Timestamp(v) => b.push_bind(*v),
                };
            }
        });

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: &'static str) -> Result<i64, WarehouseError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch_keys(&self, table: &'static str, key_column: &'static str) -> Result<BTreeSet<i64>, WarehouseError> {
        let keys: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT {col}::BIGINT FROM {table} WHERE {col} IS NOT NULL",
            col = key_column,
            table = table
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(keys.into_iter().collect())
    }
}
