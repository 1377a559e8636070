//! Read side of the warehouse: denormalized fact views and the run summary
//! figures, as consumed by the dashboard.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::WarehouseError;
use crate::model::SalesFact;
use crate::schema::ALL_TABLES;
use crate::warehouse::{PgWarehouse, Warehouse};

pub const DEFAULT_VIEW_LIMIT: i64 = 100;
pub const MAX_VIEW_LIMIT: i64 = 10_000;

/// One sales line with its dimension names joined in.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SalesViewRow {
    pub sales_key: i32,
    pub order_date: NaiveDateTime,
    pub customer_company: Option<String>,
    pub customer_name: Option<String>,
    pub customer_city: Option<String>,
    pub customer_country: Option<String>,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub employee_name: Option<String>,
    pub quantity: i32,
    pub unit_price: f64,
    pub discount: f64,
    pub tax_rate: f64,
    pub total_revenue: f64,
    pub freight_cost: Option<f64>,
    pub order_status: Option<String>,
}

/// One purchase line with its dimension names joined in.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PurchaseViewRow {
    pub purchase_key: i32,
    pub creation_date: NaiveDateTime,
    pub supplier_company: Option<String>,
    pub supplier_country: Option<String>,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub employee_name: Option<String>,
    pub quantity: i32,
    pub unit_cost: f64,
    pub total_purchase_cost: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct SalesAnalytics {
    pub total_orders: i64,
    pub total_revenue: f64,
    pub avg_revenue: f64,
    /// Lines carrying the freight tax.
    pub taxed_orders: i64,
}

impl SalesAnalytics {
    /// The same figures computed over rows still in memory.
    pub fn from_facts(facts: &[SalesFact]) -> Self {
        let revenues: Vec<f64> = facts.iter().filter_map(|f| f.total_revenue).collect();
        let total_revenue: f64 = revenues.iter().sum();
        let avg_revenue = if revenues.is_empty() {
            0.0
        } else {
            total_revenue / revenues.len() as f64
        };
        Self {
            total_orders: facts.len() as i64,
            total_revenue,
            avg_revenue,
            taxed_orders: facts.iter().filter(|f| f.tax_rate > 0.0).count() as i64,
        }
    }

    pub async fn fetch(pool: &PgPool) -> Result<Self, WarehouseError> {
        let analytics = sqlx::query_as(
            r#"
            SELECT COUNT(*) AS total_orders,
                   COALESCE(SUM(total_revenue), 0)::float8 AS total_revenue,
                   COALESCE(AVG(total_revenue), 0)::float8 AS avg_revenue,
                   COUNT(*) FILTER (WHERE tax_rate > 0) AS taxed_orders
            FROM dwh_sales_fact
            "#,
        )
        .fetch_one(pool)
        .await?;
        Ok(analytics)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseSummary {
    pub tables: Vec<TableCount>,
    pub sales: SalesAnalytics,
}

/// Row counts of all six tables, in creation order.
pub async fn table_counts<W: Warehouse>(warehouse: &W) -> Result<Vec<TableCount>, WarehouseError> {
    let mut counts = Vec::with_capacity(ALL_TABLES.len());
    for spec in ALL_TABLES {
        counts.push(TableCount {
            table: spec.name,
            rows: warehouse.count_rows(spec.name).await?,
        });
    }
    Ok(counts)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_VIEW_LIMIT).clamp(1, MAX_VIEW_LIMIT)
}

/// Most recent sales lines first.
pub async fn sales_view(pool: &PgPool, limit: Option<i64>) -> Result<Vec<SalesViewRow>, WarehouseError> {
    let rows = sqlx::query_as(
        r#"
        SELECT f.sales_key,
               f.order_date,
               c.company AS customer_company,
               NULLIF(CONCAT_WS(' ', c.first_name, c.last_name), '') AS customer_name,
               c.city AS customer_city,
               c.country_region AS customer_country,
               p.product_name,
               p.category AS product_category,
               NULLIF(CONCAT_WS(' ', e.first_name, e.last_name), '') AS employee_name,
               f.quantity,
               f.unit_price::float8 AS unit_price,
               f.discount,
               f.tax_rate,
               f.total_revenue::float8 AS total_revenue,
               f.freight_cost::float8 AS freight_cost,
               f.order_status
        FROM dwh_sales_fact f
        LEFT JOIN dwh_dim_customer c ON f.customer_key = c.customer_id
        LEFT JOIN dwh_dim_product p ON f.product_key = p.product_id
        LEFT JOIN dwh_dim_employee e ON f.employee_key = e.employee_id
        WHERE f.order_date IS NOT NULL
        ORDER BY f.order_date DESC, f.sales_key
        LIMIT $1
        "#,
    )
    .bind(clamp_limit(limit))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Most recent purchase lines first.
pub async fn purchases_view(pool: &PgPool, limit: Option<i64>) -> Result<Vec<PurchaseViewRow>, WarehouseError> {
    let rows = sqlx::query_as(
        r#"
        SELECT f.purchase_key,
               f.creation_date,
               s.company AS supplier_company,
               s.country_region AS supplier_country,
               p.product_name,
               p.category AS product_category,
               NULLIF(CONCAT_WS(' ', e.first_name, e.last_name), '') AS employee_name,
               f.quantity,
               f.unit_cost::float8 AS unit_cost,
               f.total_purchase_cost::float8 AS total_purchase_cost
        FROM dwh_purchases_fact f
        LEFT JOIN dwh_dim_supplier s ON f.supplier_key = s.supplier_id
        LEFT JOIN dwh_dim_product p ON f.product_key = p.product_id
        LEFT JOIN dwh_dim_employee e ON f.employee_key = e.employee_id
        WHERE f.creation_date IS NOT NULL
        ORDER BY f.creation_date DESC, f.purchase_key
        LIMIT $1
        "#,
    )
    .bind(clamp_limit(limit))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn warehouse_summary(warehouse: &PgWarehouse) -> Result<WarehouseSummary, WarehouseError> {
    Ok(WarehouseSummary {
        tables: table_counts(warehouse).await?,
        sales: SalesAnalytics::fetch(warehouse.pool()).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_table;
    use crate::model::EmployeeRow;
    use crate::schema::{ensure_schema, DIM_EMPLOYEE_TABLE};
    use crate::warehouse::MemoryWarehouse;

    fn sale(revenue: Option<f64>, tax_rate: f64) -> SalesFact {
        SalesFact {
            order_date: None,
            customer_key: None,
            employee_key: None,
            product_key: None,
            quantity: Some(1),
            unit_price: revenue,
            discount: 0.0,
            tax_rate,
            total_revenue: revenue,
            freight_cost: None,
            order_status: None,
        }
    }

    #[test]
    fn test_analytics_from_facts() {
        let a = SalesAnalytics::from_facts(&[sale(Some(54.0), 0.1), sale(Some(6.0), 0.0), sale(None, 0.0)]);
        assert_eq!(a.total_orders, 3);
        assert_eq!(a.total_revenue, 60.0);
        assert_eq!(a.avg_revenue, 30.0);
        assert_eq!(a.taxed_orders, 1);
    }

    #[test]
    fn test_analytics_empty() {
        assert_eq!(SalesAnalytics::from_facts(&[]), SalesAnalytics::default());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_VIEW_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(1_000_000)), MAX_VIEW_LIMIT);
    }

    #[tokio::test]
    async fn test_summary_reports_unreachable_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy("postgres://etl@127.0.0.1:1/warehouse")
            .unwrap();
        let warehouse = PgWarehouse::from_pool(pool);
        assert!(matches!(
            warehouse_summary(&warehouse).await,
            Err(WarehouseError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_table_counts_cover_all_tables() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();
        load_table(&w, &[EmployeeRow::placeholder(1, "Unknown")], 1000).await.unwrap();

        let counts = table_counts(&w).await.unwrap();
        assert_eq!(counts.len(), 6);
        let employees = counts.iter().find(|c| c.table == DIM_EMPLOYEE_TABLE).unwrap();
        assert_eq!(employees.rows, 1);
        assert_eq!(counts.iter().map(|c| c.rows).sum::<i64>(), 1);
    }
}
