//! Ingestion listener
//!
//! Raw telemetry arrives on the pub/sub transport and is handed to a single
//! consuming task through a bounded channel:
//!
//! ```text
//!  transport pump ──try_send──► [mpsc, bounded] ──► ListenerService
//!                                                      │
//!                                     IngestionListener::handle(msg)
//!                                                      │
//!                     region = topic segment [1] ──► CodecRegistry::decode_str
//!                                                      │
//!                         ┌──── Ok ────────────────────┴──── Err ─────┐
//!                         ▼                                           ▼
//!            ReadingStore::append                         warn + count + drop
//!                         │
//!            Republisher::publish ──► PublishOutcome
//! ```
//!
//! Messages are processed one at a time, in channel order. A decode failure
//! never reaches the store or the sinks and is never retried.

pub mod stats;

pub use stats::{IngestionStats, IngestionStatsSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::codec::{CodecRegistry, DecodeError, DecodeErrorKind};
use crate::metrics;
use crate::republish::{PublishOutcome, Republisher};
use crate::services::{Service, ServiceError, ServiceStatus, StatusCell};
use crate::store::ReadingStore;
use crate::transport::InboundMessage;

/// Bounded hand-off channel between a transport and the listener
pub fn channel(capacity: usize) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Region identifier carried in the second topic level (`drones/{region}/...`)
pub fn region_segment(topic: &str) -> Option<&str> {
    topic.split('/').nth(1)
}

// ============================================================================
// Listener
// ============================================================================

/// Decodes, stores and republishes one message at a time
pub struct IngestionListener {
    registry: CodecRegistry,
    store: Arc<ReadingStore>,
    republisher: Arc<Republisher>,
    stats: Arc<IngestionStats>,
}

impl IngestionListener {
    pub fn new(
        registry: CodecRegistry,
        store: Arc<ReadingStore>,
        republisher: Arc<Republisher>,
        stats: Arc<IngestionStats>,
    ) -> Self {
        Self {
            registry,
            store,
            republisher,
            stats,
        }
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<IngestionStats> {
        &self.stats
    }

    /// Handle one inbound message
    ///
    /// Returns the sink outcome for a decoded reading, `None` when the
    /// message was dropped.
    pub async fn handle(&self, msg: InboundMessage) -> Option<PublishOutcome> {
        self.stats.record_received();

        let payload = msg.payload_str();
        let decoded = match region_segment(&msg.topic) {
            Some(region) => self.registry.decode_str(region, &payload),
            None => Err(DecodeError::unknown_region("").with_context(&payload)),
        };

        let reading = match decoded {
            Ok(reading) => reading,
            Err(e) => {
                self.reject(&msg.topic, &e);
                return None;
            },
        };

        metrics::record_received(reading.region().as_str());
        self.stats.record_decoded();

        let shared = self.store.append(reading);
        debug!(topic = %msg.topic, region = %shared.region(), "Reading stored");

        let outcome = self.republisher.publish(shared).await;
        self.stats.record_outcome(outcome);
        Some(outcome)
    }

    fn reject(&self, topic: &str, err: &DecodeError) {
        let label = if matches!(err.kind, DecodeErrorKind::UnknownRegion { .. }) {
            "unknown"
        } else {
            region_segment(topic).unwrap_or("unknown")
        };
        metrics::record_received(label);
        metrics::record_decode_failure(err.kind_label());
        self.stats.record_decode_failure(err);
        warn!(topic, kind = err.kind_label(), error = %err, "Dropping undecodable message");
    }
}

// ============================================================================
// Service
// ============================================================================

/// Runs an [`IngestionListener`] over a channel receiver until shutdown
pub struct ListenerService {
    listener: Arc<IngestionListener>,
    rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    status: StatusCell,
    handled: AtomicU64,
}

impl ListenerService {
    pub fn new(listener: Arc<IngestionListener>, rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            listener,
            rx: Mutex::new(Some(rx)),
            status: StatusCell::default(),
            handled: AtomicU64::new(0),
        }
    }

    /// Messages taken off the channel so far
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Service for ListenerService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        let mut rx = self.rx.lock().take().ok_or_else(|| {
            ServiceError::InitializationFailed("listener receiver already taken".to_string())
        })?;

        self.status.set(ServiceStatus::Running);
        info!("Ingestion listener running");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        self.handled.fetch_add(1, Ordering::Relaxed);
                        self.listener.handle(msg).await;
                    },
                    None => {
                        debug!("Ingestion channel closed");
                        break;
                    },
                },
            }
        }

        self.status.set(ServiceStatus::Stopped);
        info!(handled = self.handled(), "Ingestion listener stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ingestion-listener"
    }

    fn status(&self) -> ServiceStatus {
        self.status.get()
    }
}
