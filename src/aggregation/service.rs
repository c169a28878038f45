//! Periodic dashboard service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::render::DashboardRenderer;
use crate::metrics;
use crate::services::{Service, ServiceError, ServiceStatus, StatusCell};
use crate::store::ReadingStore;

/// Renders a store every `interval` and keeps the last report
pub struct AggregatorService {
    name: &'static str,
    store: Arc<ReadingStore>,
    interval: Duration,
    last_report: RwLock<Option<String>>,
    status: StatusCell,
}

impl AggregatorService {
    /// Service named `name` rendering `store` every `interval`
    pub fn new(name: &'static str, store: Arc<ReadingStore>, interval: Duration) -> Self {
        Self {
            name,
            store,
            interval,
            last_report: RwLock::new(None),
            status: StatusCell::default(),
        }
    }

    /// Render once, remember the result and refresh the store gauges
    pub fn tick(&self) -> String {
        let report = DashboardRenderer::render_store(&self.store);
        metrics::update_store_counts(&self.store.counts());
        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Most recent periodic report, if one has been rendered
    pub fn last_report(&self) -> Option<String> {
        self.last_report.read().clone()
    }

    /// Rendering period
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Service for AggregatorService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        if self.interval.is_zero() {
            return Err(ServiceError::InitializationFailed(
                "aggregator interval must be greater than 0".to_string(),
            ));
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.status.set(ServiceStatus::Running);
        debug!(service = self.name, interval = ?self.interval, "Aggregator running");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let report = self.tick();
                    info!(service = self.name, "\n{}", report);
                },
            }
        }

        self.status.set(ServiceStatus::Stopped);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn status(&self) -> ServiceStatus {
        self.status.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::NO_DATA_NOTICE;
    use crate::types::{Reading, Region};

    #[test]
    fn test_tick_keeps_last_report() {
        let store = Arc::new(ReadingStore::new());
        let service = AggregatorService::new("agg", Arc::clone(&store), Duration::from_secs(10));
        assert!(service.last_report().is_none());

        assert!(service.tick().contains(NO_DATA_NOTICE));
        store.append(Reading::new(Region::Norte, 1.0, 2.0, 3.0, 4.0).unwrap());
        service.tick();
        assert!(service.last_report().unwrap().contains("Total readings: 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_period_until_shutdown() {
        let store = Arc::new(ReadingStore::new());
        let service = Arc::new(AggregatorService::new(
            "agg",
            Arc::clone(&store),
            Duration::from_secs(10),
        ));
        let (tx, rx) = broadcast::channel(1);

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.start(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(service.last_report().is_none());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(service.last_report().is_some());

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let service = AggregatorService::new("agg", Arc::new(ReadingStore::new()), Duration::ZERO);
        let (_tx, rx) = broadcast::channel(1);
        assert!(service.start(rx).await.is_err());
    }
}
