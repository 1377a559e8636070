//! API Service - read-only query surface over the Northwind warehouse
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /sales - Sales lines with customer, product and employee names
//! - GET /purchases - Purchase lines with supplier, product and employee names
//! - GET /summary - Table row counts and sales analytics

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use etl::error::WarehouseError;
use etl::query::{purchases_view, sales_view, warehouse_summary};
use etl::warehouse::PgWarehouse;

// ============================================================================
// State
// ============================================================================

struct AppState {
    warehouse: PgWarehouse,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct ViewQuery {
    limit: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

fn internal_error(e: WarehouseError) -> axum::response::Response {
    error!(error = %e, "query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
        .into_response()
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn sales_handler(State(state): State<Arc<AppState>>, Query(params): Query<ViewQuery>) -> impl IntoResponse {
    match sales_view(state.warehouse.pool(), params.limit).await {
        Ok(rows) => Json(serde_json::json!({ "count": rows.len(), "sales": rows })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn purchases_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewQuery>,
) -> impl IntoResponse {
    match purchases_view(state.warehouse.pool(), params.limit).await {
        Ok(rows) => Json(serde_json::json!({ "count": rows.len(), "purchases": rows })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn summary_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match warehouse_summary(&state.warehouse).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

fn router(state: Arc<AppState>) -> Router {
    // CORS for the dashboard frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/sales", get(sales_handler))
        .route("/purchases", get(purchases_handler))
        .route("/summary", get(summary_handler))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    info!("connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    let state = Arc::new(AppState {
        warehouse: PgWarehouse::from_pool(pool),
    });

    info!(%bind, "api listening");
    info!("endpoints: GET /health, /sales?limit=, /purchases?limit=, /summary");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
