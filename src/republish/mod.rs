//! Dual-sink republisher
//!
//! Every decoded reading leaves the gateway twice:
//!
//! ```text
//!                      ┌── task ─► DirectSink ── display form ─► pub/sub
//!  publish(reading) ───┤
//!                      └── task ─► BusSink ───── record form ──► exchange
//!                                     │
//!            join both ◄──────────────┘  PublishOutcome { direct, bus }
//! ```
//!
//! The sinks run in separate tasks, each under its own timeout. An error,
//! timeout or panic in one sink only turns that sink's flag to `false`; the
//! other is unaffected. Nothing is retried.

pub mod sink;

pub use sink::{routing_key, BusSink, DirectSink, Sink, SinkError};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::metrics;
use crate::types::Reading;

/// Per-sink result of one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PublishOutcome {
    /// Direct pub/sub sink succeeded
    pub direct: bool,
    /// Message bus sink succeeded
    pub bus: bool,
}

impl PublishOutcome {
    /// `(direct, bus)`
    pub fn as_tuple(&self) -> (bool, bool) {
        (self.direct, self.bus)
    }

    /// Both sinks succeeded
    pub fn all_ok(&self) -> bool {
        self.direct && self.bus
    }
}

/// Fans one reading out to both sinks concurrently
pub struct Republisher {
    direct: Arc<dyn Sink>,
    bus: Arc<dyn Sink>,
    timeout: Duration,
}

impl Republisher {
    /// Republisher over the two sinks with a per-sink timeout
    pub fn new(direct: Arc<dyn Sink>, bus: Arc<dyn Sink>, timeout: Duration) -> Self {
        Self {
            direct,
            bus,
            timeout,
        }
    }

    /// Publish to both sinks and report each outcome independently
    pub async fn publish(&self, reading: Arc<Reading>) -> PublishOutcome {
        let direct = self.spawn_send(Arc::clone(&self.direct), Arc::clone(&reading));
        let bus = self.spawn_send(Arc::clone(&self.bus), Arc::clone(&reading));

        let (direct_res, bus_res) = tokio::join!(direct, bus);

        PublishOutcome {
            direct: report(self.direct.name(), &reading, direct_res),
            bus: report(self.bus.name(), &reading, bus_res),
        }
    }

    fn spawn_send(
        &self,
        sink: Arc<dyn Sink>,
        reading: Arc<Reading>,
    ) -> tokio::task::JoinHandle<(Result<(), SinkError>, Duration)> {
        let timeout = self.timeout;
        tokio::spawn(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, sink.send(&reading)).await {
                Ok(res) => res,
                Err(_) => Err(SinkError::Timeout(timeout)),
            };
            (result, started.elapsed())
        })
    }
}

/// Log and count one sink result, returning whether it succeeded
fn report(
    sink: &'static str,
    reading: &Reading,
    joined: Result<(Result<(), SinkError>, Duration), JoinError>,
) -> bool {
    let (result, elapsed) = match joined {
        Ok(pair) => pair,
        Err(e) => (Err(SinkError::Panicked(e.to_string())), Duration::ZERO),
    };

    let ok = result.is_ok();
    metrics::record_sink(sink, ok, elapsed.as_secs_f64());

    match result {
        Ok(()) => debug!(sink, region = %reading.region(), "Reading republished"),
        Err(e) => warn!(sink, region = %reading.region(), error = %e, "Sink publish failed"),
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        Fail,
        Hang,
        Panic,
    }

    struct ScriptedSink {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedSink {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Sink for ScriptedSink {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _reading: &Reading) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(SinkError::Unavailable(self.name)),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                },
                Behavior::Panic => panic!("sink exploded"),
            }
        }
    }

    fn reading() -> Arc<Reading> {
        Arc::new(Reading::new(Region::Norte, 1.0, 2.0, 3.0, 4.0).unwrap())
    }

    #[tokio::test]
    async fn test_both_sinks_succeed() {
        let a = ScriptedSink::new("direct", Behavior::Succeed);
        let b = ScriptedSink::new("bus", Behavior::Succeed);
        let republisher = Republisher::new(a.clone(), b.clone(), Duration::from_secs(1));

        let outcome = republisher.publish(reading()).await;
        assert_eq!(outcome.as_tuple(), (true, true));
        assert!(outcome.all_ok());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_direct_does_not_affect_bus() {
        let republisher = Republisher::new(
            ScriptedSink::new("direct", Behavior::Fail),
            ScriptedSink::new("bus", Behavior::Succeed),
            Duration::from_secs(1),
        );
        assert_eq!(republisher.publish(reading()).await.as_tuple(), (false, true));
    }

    #[tokio::test]
    async fn test_failing_bus_does_not_affect_direct() {
        let republisher = Republisher::new(
            ScriptedSink::new("direct", Behavior::Succeed),
            ScriptedSink::new("bus", Behavior::Fail),
            Duration::from_secs(1),
        );
        assert_eq!(republisher.publish(reading()).await.as_tuple(), (true, false));
    }

    #[tokio::test]
    async fn test_hanging_sink_times_out() {
        let republisher = Republisher::new(
            ScriptedSink::new("direct", Behavior::Hang),
            ScriptedSink::new("bus", Behavior::Succeed),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        assert_eq!(republisher.publish(reading()).await.as_tuple(), (false, true));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panicking_sink_is_isolated() {
        let republisher = Republisher::new(
            ScriptedSink::new("direct", Behavior::Succeed),
            ScriptedSink::new("bus", Behavior::Panic),
            Duration::from_secs(1),
        );
        assert_eq!(republisher.publish(reading()).await.as_tuple(), (true, false));
    }
}
