//! Message bus consumer
//!
//! Binds to the gateway's topic exchange, rebuilds readings from their
//! record form and keeps its own region store, optionally writing an audit
//! line per record:
//!
//! ```text
//!  exchange ──bind(binding)──► [mpsc] ──► BusConsumer::handle
//!                                            │ decode_record
//!                            ┌───── Ok ──────┴───── Err ─────┐
//!                            ▼                               ▼
//!                  ReadingStore::append               warn + [ERRO] line
//!                  audit [ROUTING.KEY] display form
//! ```
//!
//! A bare region binding such as `norte` is widened to the key the gateway
//! actually emits (`dados.norte`) by [`normalize_binding`].

pub mod audit;

pub use audit::AuditLog;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::codec::canonical::{decode_record, encode_display};
use crate::metrics;
use crate::services::{Service, ServiceError, ServiceStatus, StatusCell};
use crate::store::ReadingStore;
use crate::transport::{InboundMessage, TopicExchange};
use crate::types::Reading;

/// Resolve a user binding against the gateway's routing key prefix
///
/// Wildcard patterns, keys already under `prefix` and the bare prefix are
/// returned unchanged; any other key is placed under `prefix`.
///
/// ```rust
/// use drone_gateway::consumer::normalize_binding;
///
/// assert_eq!(normalize_binding("norte", "dados"), "dados.norte");
/// assert_eq!(normalize_binding("#", "dados"), "#");
/// assert_eq!(normalize_binding("*.sul", "dados"), "*.sul");
/// assert_eq!(normalize_binding("dados.leste", "dados"), "dados.leste");
/// ```
pub fn normalize_binding(binding: &str, prefix: &str) -> String {
    let binding = binding.trim();
    let has_wildcard = binding.split('.').any(|w| w == "#" || w == "*");
    let under_prefix = binding == prefix || binding.starts_with(&format!("{}.", prefix));

    if prefix.is_empty() || binding.is_empty() || has_wildcard || under_prefix {
        binding.to_string()
    } else {
        format!("{}.{}", prefix, binding)
    }
}

/// Settings for one consumer
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Exchange to bind to
    pub exchange: String,
    /// Binding key, already normalized
    pub binding: String,
    /// Capacity of the delivery channel
    pub channel_capacity: usize,
}

/// Consumes records from the bus into a local store
pub struct BusConsumer {
    transport: Arc<dyn TopicExchange>,
    settings: ConsumerSettings,
    store: Arc<ReadingStore>,
    audit: Option<AuditLog>,
    status: StatusCell,
    consumed: AtomicU64,
    rejected: AtomicU64,
}

impl BusConsumer {
    pub fn new(
        transport: Arc<dyn TopicExchange>,
        settings: ConsumerSettings,
        store: Arc<ReadingStore>,
        audit: Option<AuditLog>,
    ) -> Self {
        Self {
            transport,
            settings,
            store,
            audit,
            status: StatusCell::default(),
            consumed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Binding key in use
    pub fn binding(&self) -> &str {
        &self.settings.binding
    }

    /// Store receiving consumed readings
    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    /// Records accepted so far
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Records rejected so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Decode and store one delivered record
    pub fn handle(&self, msg: &InboundMessage) -> Option<Arc<Reading>> {
        let payload = msg.payload_str();
        match decode_record(&payload) {
            Ok(reading) => {
                let shared = self.store.append(reading);
                self.consumed.fetch_add(1, Ordering::Relaxed);
                metrics::record_consumed(true);
                if let Some(audit) = &self.audit {
                    audit.record(&msg.topic, &encode_display(&shared));
                }
                debug!(routing_key = %msg.topic, region = %shared.region(), "Record consumed");
                Some(shared)
            },
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_consumed(false);
                metrics::record_decode_failure(e.kind_label());
                if let Some(audit) = &self.audit {
                    audit.error(&format!("invalid record on '{}': {}", msg.topic, e));
                }
                warn!(routing_key = %msg.topic, kind = e.kind_label(), error = %e, "Dropping invalid record");
                None
            },
        }
    }
}

#[async_trait]
impl Service for BusConsumer {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        let settings = &self.settings;
        self.transport
            .declare(&settings.exchange)
            .await
            .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel(settings.channel_capacity.max(1));
        let subscription = self
            .transport
            .bind(&settings.exchange, &settings.binding, tx)
            .await
            .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;

        self.status.set(ServiceStatus::Running);
        if let Some(audit) = &self.audit {
            audit.system(&format!("session started, binding '{}'", settings.binding));
        }
        info!(
            exchange = %settings.exchange,
            binding = %settings.binding,
            "Bus consumer waiting for records"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        self.handle(&msg);
                    },
                    None => break,
                },
            }
        }

        subscription.cancel();
        if let Some(audit) = &self.audit {
            audit.system(&format!(
                "session ended, {} records consumed, {} rejected",
                self.consumed(),
                self.rejected()
            ));
        }
        self.status.set(ServiceStatus::Stopped);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bus-consumer"
    }

    fn status(&self) -> ServiceStatus {
        self.status.get()
    }
}
