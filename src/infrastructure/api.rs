//! Stats API (Cold Path)
//!
//! Read-only HTTP view of a running server: metrics snapshot, buffer pool
//! occupancy and event loop state. Never touches the socket.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use crate::engine::{ServerHandle, ServerState};
use crate::infrastructure::metrics::MetricsSnapshot;
use crate::infrastructure::pool::PoolStats;
use crate::Result;

/// Response for /api/stats
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    pub state: ServerState,
    pub local_addr: String,
    pub metrics: MetricsSnapshot,
    pub mean_latency_us: Option<f64>,
    pub p50_latency_us: Option<u64>,
    pub p99_latency_us: Option<u64>,
    pub pool: PoolStats,
}

/// Response for /api/health
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    /// No stop has been requested
    pub running: bool,
    /// The loop has entered its first iteration and not stopped
    pub event_loop_active: bool,
    pub state: ServerState,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub handle: ServerHandle,
}

/// Build the API router
pub fn router(handle: ServerHandle) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(AppState { handle })
}

/// Start the API server
pub async fn start_server(handle: ServerHandle, port: u16) -> Result<()> {
    let app = router(handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Handler for /api/stats
async fn get_stats(State(state): State<AppState>) -> Json<StatsDto> {
    let handle = &state.handle;
    let metrics = handle.snapshot();

    Json(StatsDto {
        state: handle.state(),
        local_addr: handle.local_addr().to_string(),
        mean_latency_us: metrics.mean_latency_us(),
        p50_latency_us: metrics.latency_quantile_us(0.50),
        p99_latency_us: metrics.latency_quantile_us(0.99),
        metrics,
        pool: handle.pool_stats(),
    })
}

/// Handler for /api/health
async fn get_health(State(state): State<AppState>) -> Json<HealthDto> {
    let server_state = state.handle.state();
    Json(HealthDto {
        running: state.handle.is_running(),
        event_loop_active: server_state.is_running(),
        state: server_state,
    })
}
