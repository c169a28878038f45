//! HTTP surface for dashboards and health
//!
//! # Endpoints
//!
//! - `GET /dashboard` - current report as text
//! - `GET /health` - service health (JSON)
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/stats` - store counts and ingestion counters (JSON)
//!
//! Any other method on these paths answers `405 Method Not Allowed`.

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::ingestion::stats::IngestionStats;
use crate::services::ServiceManager;
use crate::store::ReadingStore;

// =============================================================================
// Application State
// =============================================================================

/// State shared by every handler
pub struct AppState {
    /// Store the dashboard is rendered from
    pub store: Arc<ReadingStore>,
    /// Listener counters; absent in consumer mode
    pub ingestion: Option<Arc<IngestionStats>>,
    /// Services reported by `/health`
    pub services: Arc<ServiceManager>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<ReadingStore>,
        ingestion: Option<Arc<IngestionStats>>,
        services: Arc<ServiceManager>,
    ) -> Self {
        Self {
            store,
            ingestion,
            services,
            started_at: Instant::now(),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the dashboard router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/stats", get(handlers::get_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
