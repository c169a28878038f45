//! HTTP surface tests driven through the router with `oneshot`

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use drone_gateway::aggregation::NO_DATA_NOTICE;
use drone_gateway::codec::DecodeError;
use drone_gateway::dashboard::{build_router, AppState};
use drone_gateway::ingestion::IngestionStats;
use drone_gateway::services::{Service, ServiceError, ServiceManager, ServiceStatus};
use drone_gateway::store::ReadingStore;
use drone_gateway::{Reading, Region};
use tokio::sync::broadcast;
use tower::ServiceExt;

struct Fixture {
    store: Arc<ReadingStore>,
    stats: Arc<IngestionStats>,
    router: Router,
}

fn fixture() -> Fixture {
    let store = Arc::new(ReadingStore::new());
    let stats = Arc::new(IngestionStats::new());
    let state = AppState::new(
        Arc::clone(&store),
        Some(Arc::clone(&stats)),
        Arc::new(ServiceManager::with_defaults()),
    );
    Fixture {
        store,
        stats,
        router: build_router(Arc::new(state)),
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_dashboard_empty_store() {
    let fx = fixture();
    let (status, body) = get(fx.router, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(NO_DATA_NOTICE));
}

#[tokio::test]
async fn test_dashboard_reports_rankings() {
    let fx = fixture();
    fx.store
        .append(Reading::new(Region::Sul, 1000.0, 1.0, 20.0, 50.0).unwrap());
    fx.store
        .append(Reading::new(Region::Norte, 1000.0, 1.0, 30.0, 50.0).unwrap());
    fx.store
        .append(Reading::new(Region::Sul, 1000.0, 1.0, 10.0, 50.0).unwrap());

    let (status, body) = get(fx.router, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Total readings: 3"));

    let temps = body.split(">> temperature").nth(1).unwrap();
    let norte = temps.find("- norte: 30.00").unwrap();
    let sul = temps.find("- sul: 15.00").unwrap();
    assert!(norte < sul);
}

#[tokio::test]
async fn test_dashboard_rejects_other_methods() {
    let fx = fixture();
    let response = fx
        .router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let fx = fixture();
    fx.store
        .append(Reading::new(Region::Leste, 990.0, 410.0, 30.0, 55.5).unwrap());
    fx.stats.record_received();
    fx.stats.record_decoded();
    fx.stats.record_received();
    fx.stats
        .record_decode_failure(&DecodeError::field_count(4, 3));

    let (status, body) = get(fx.router, "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["total_readings"], 1);
    assert_eq!(json["regions"][2]["region"], "leste");
    assert_eq!(json["regions"][2]["readings"], 1);
    assert_eq!(json["ingestion"]["received"], 2);
    assert_eq!(json["ingestion"]["decode_failures"]["field_count_mismatch"], 1);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let fx = fixture();
    let (status, body) = get(fx.router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");

    let (status, body) = get(fx.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("gateway_store_readings"));
}

struct UnreachableBus;

#[async_trait::async_trait]
impl Service for UnreachableBus {
    async fn start(&self, _shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        Err(ServiceError::InitializationFailed("exchange declare refused".into()))
    }

    fn name(&self) -> &'static str {
        "bus-consumer"
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus::Starting
    }
}

#[tokio::test]
async fn test_health_reports_failed_service() {
    let services = Arc::new(ServiceManager::with_defaults());
    services.register(Arc::new(UnreachableBus)).unwrap();
    services.start_all().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let state = AppState::new(Arc::new(ReadingStore::new()), None, Arc::clone(&services));
    let (status, body) = get(build_router(Arc::new(state)), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["services"][0]["name"], "bus-consumer");
    assert_eq!(json["services"][0]["status"]["state"], "failed");
    assert!(json["services"][0]["status"]["reason"]
        .as_str()
        .unwrap()
        .contains("exchange declare refused"));

    services.shutdown().await;
}
