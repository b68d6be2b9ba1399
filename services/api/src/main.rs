//! API Service - Read access to the plant_data fact store
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /plants - Distinct plant names
//! - GET /data - Rows by time-block range and optional plant set
//! - GET /runs/latest - Last ingest run and its report
//!
//! No aggregation happens here; ingestion already produced one row per
//! (time block, plant).

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ingest::model::{FIRST_BLOCK, LAST_BLOCK};
use ingest::{Config, FactStore};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    store: FactStore,
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
struct RunResponse {
    run_id: String,
    started_at: String,
    finished_at: String,
    fact_rows: i64,
    report: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Query params
// ============================================================================

/// Validated `/data` parameters.
#[derive(Debug, PartialEq)]
struct DataQuery {
    plants: Vec<String>,
    start_block: u8,
    end_block: u8,
}

fn parse_block_param(name: &str, value: &str) -> Result<u8, String> {
    let block: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{} must be an integer, got '{}'", name, value))?;
    if !(FIRST_BLOCK as i64..=LAST_BLOCK as i64).contains(&block) {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            name, FIRST_BLOCK, LAST_BLOCK, block
        ));
    }
    Ok(block as u8)
}

/// Parse raw query pairs. `plants` may repeat; unknown keys are ignored.
fn parse_data_query(pairs: &[(String, String)]) -> Result<DataQuery, String> {
    let mut query = DataQuery {
        plants: Vec::new(),
        start_block: FIRST_BLOCK,
        end_block: LAST_BLOCK,
    };

    for (key, value) in pairs {
        match key.as_str() {
            "plants" => {
                let plant = value.trim();
                if !plant.is_empty() && !query.plants.iter().any(|p| p == plant) {
                    query.plants.push(plant.to_string());
                }
            }
            "start_block" => query.start_block = parse_block_param(key, value)?,
            "end_block" => query.end_block = parse_block_param(key, value)?,
            _ => {}
        }
    }

    if query.start_block > query.end_block {
        return Err(format!(
            "start_block ({}) is after end_block ({})",
            query.start_block, query.end_block
        ));
    }
    Ok(query)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn plants_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.plant_names().await {
        Ok(names) => Json(names).into_response(),
        Err(e) => {
            error!(error = %e, "plant name query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn data_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let params = match parse_data_query(&pairs) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    match state
        .store
        .rows_between(params.start_block, params.end_block, &params.plants)
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!(error = %e, "data query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn latest_run_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.latest_run().await {
        Ok(Some(run)) => Json(RunResponse {
            report: run.report(),
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: run.finished_at,
            fact_rows: run.fact_rows,
        })
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no ingest run recorded"),
        Err(e) => {
            error!(error = %e, "run query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
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
        .route("/plants", get(plants_handler))
        .route("/data", get(data_handler))
        .route("/runs/latest", get(latest_run_handler))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let config = Config::from_env();

    info!(db_url = %config.db_url, "opening fact store");
    let store = FactStore::open_read_only(&config.db_url)
        .await
        .with_context(|| format!("Failed to open fact store {}", config.db_url))?;

    let app = router(Arc::new(AppState { store }));

    info!(bind = %config.api_bind, "API listening");
    println!("\nEndpoints:");
    println!("  GET /health");
    println!("  GET /plants");
    println!("  GET /data?start_block=&end_block=&plants=&plants=");
    println!("  GET /runs/latest");

    let listener = tokio::net::TcpListener::bind(&config.api_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
