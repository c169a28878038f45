//! Dashboard HTTP handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use super::AppState;
use crate::aggregation::DashboardRenderer;
use crate::ingestion::stats::IngestionStatsSnapshot;
use crate::metrics;
use crate::services::ServiceStatus;
use crate::types::Region;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub services: Vec<ServiceHealth>,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RegionCount {
    pub region: Region,
    pub readings: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_readings: usize,
    pub regions: Vec<RegionCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<IngestionStatsSnapshot>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Current dashboard text
pub async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = DashboardRenderer::render_store(&state.store);
    (StatusCode::OK, [("content-type", TEXT_PLAIN)], report)
}

/// Health check; 503 when any service has stopped or failed
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.services.is_healthy();
    let services = state
        .services
        .status()
        .into_iter()
        .map(|(name, status)| ServiceHealth {
            name,
            status,
            uptime_secs: state.services.service_uptime(name).map(|d| d.as_secs()),
        })
        .collect();

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    metrics::HEALTH_STATUS.set(if healthy { 1.0 } else { 0.0 });

    (
        code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.started_at.elapsed().as_secs(),
            services,
        }),
    )
}

/// Prometheus metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::update_uptime(state.started_at.elapsed().as_secs_f64());
    metrics::update_store_counts(&state.store.counts());

    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_PLAIN)], body),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", TEXT_PLAIN)], e)
        },
    }
}

/// Store counts plus ingestion counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let regions = state
        .store
        .counts()
        .into_iter()
        .map(|(region, readings)| RegionCount { region, readings })
        .collect::<Vec<_>>();

    Json(StatsResponse {
        total_readings: regions.iter().map(|r| r.readings).sum(),
        regions,
        ingestion: state.ingestion.as_ref().map(|s| s.snapshot()),
    })
}
