//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Module name ("presswork-server")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Active storage backend ("sqlite" or "memory")
    pub storage: String,
    /// Sessions currently subscribed to the push channel
    pub sessions: usize,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "presswork-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: state.storage_backend.to_string(),
        sessions: state.bus.subscriber_count(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// Build health check routes
pub fn health_routes() -> axum::Router<AppState> {
    Router::new().route("/health", get(health_check))
}
