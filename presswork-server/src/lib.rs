//! presswork-server library interface
//!
//! Exposes the stores, workflow layer and HTTP router so integration tests can
//! drive the whole server in-process.

pub mod api;
pub mod error;
pub mod store;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;
use std::time::Duration;

use axum::{http::Uri, Router};
use chrono::{DateTime, Utc};
use presswork_common::config::{StorageBackend, DEFAULT_HEARTBEAT_SECS};
use presswork_common::events::NotificationBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::store::Storage;
use crate::workflow::{ReprintRequestManager, WorkflowEngine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub reprints: Arc<ReprintRequestManager>,
    /// Fan-out to connected department sessions
    pub bus: NotificationBus,
    pub storage_backend: StorageBackend,
    /// Idle interval between SSE heartbeat comments
    pub heartbeat: Duration,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(storage: Storage, bus: NotificationBus) -> Self {
        let engine = WorkflowEngine::new(storage.activities.clone(), bus.clone());
        let reprints =
            ReprintRequestManager::new(storage.reprints, storage.activities, bus.clone());

        Self {
            engine: Arc::new(engine),
            reprints: Arc::new(reprints),
            bus,
            storage_backend: storage.backend,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            startup_time: Utc::now(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::activity_routes())
        .merge(api::reprint_routes())
        .merge(api::health_routes())
        .merge(api::event_routes())
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Unknown paths answer with the same error body as every other failure
async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
