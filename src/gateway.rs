//! Gateway and consumer node wiring
//!
//! ```text
//!  Transports::connect(config) ── fatal on failure
//!        │
//!  Gateway::start()
//!        ├── BusSink::declare(exchange)
//!        ├── PubSub::subscribe(input_filter) ──► [mpsc] ──► ListenerService
//!        ├── AggregatorService (optional)
//!        └── ServiceManager::start_all()
//!
//!  Gateway::shutdown()
//!        ├── cancel input subscription
//!        ├── ServiceManager::shutdown()
//!        └── close transports
//! ```
//!
//! [`ConsumerNode`] is the bus-side counterpart: a [`BusConsumer`] with its
//! own store and aggregator.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::aggregation::AggregatorService;
use crate::codec::CodecRegistry;
use crate::config::{GatewayConfig, TransportBackend, TransportConfig};
use crate::consumer::{normalize_binding, AuditLog, BusConsumer, ConsumerSettings};
use crate::dashboard::AppState;
use crate::error::Result;
use crate::ingestion::{self, IngestionListener, IngestionStats, ListenerService};
use crate::republish::{BusSink, DirectSink, Republisher};
use crate::services::{Service, ServiceConfig, ServiceManager};
use crate::store::ReadingStore;
use crate::transport::{MemoryBroker, PubSub, RedisTransport, Subscription, TopicExchange};

// =============================================================================
// Transports
// =============================================================================

/// The two transport roles, possibly backed by the same connection
#[derive(Clone)]
pub struct Transports {
    pub pubsub: Arc<dyn PubSub>,
    pub exchange: Arc<dyn TopicExchange>,
}

impl Transports {
    /// Both roles served by one in-process broker
    pub fn memory(broker: MemoryBroker) -> Self {
        Self {
            pubsub: Arc::new(broker.clone()),
            exchange: Arc::new(broker),
        }
    }

    /// Both roles served by one Redis connection
    pub fn redis(transport: RedisTransport) -> Self {
        Self {
            pubsub: Arc::new(transport.clone()),
            exchange: Arc::new(transport),
        }
    }

    /// Open the configured backend; an unreachable broker is an error
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        match config.backend {
            TransportBackend::Memory => {
                info!("Using in-process memory broker");
                Ok(Self::memory(MemoryBroker::new()))
            },
            TransportBackend::Redis => {
                let transport = RedisTransport::connect(config.redis()).await?;
                Ok(Self::redis(transport))
            },
        }
    }

    /// Close both roles
    pub async fn close(&self) {
        self.pubsub.close().await;
        self.exchange.close().await;
    }
}

fn service_manager() -> Arc<ServiceManager> {
    Arc::new(ServiceManager::new(ServiceConfig::default()))
}

// =============================================================================
// Gateway
// =============================================================================

/// Ingests raw telemetry, keeps the store and republishes readings
pub struct Gateway {
    config: GatewayConfig,
    transports: Transports,
    store: Arc<ReadingStore>,
    stats: Arc<IngestionStats>,
    services: Arc<ServiceManager>,
    input: Mutex<Option<Subscription>>,
}

impl Gateway {
    /// Validate the config and connect to the configured transport
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let transports = Transports::connect(&config.transport).await?;
        Ok(Self::with_transports(config, transports))
    }

    /// Gateway over already connected transports
    pub fn with_transports(config: GatewayConfig, transports: Transports) -> Self {
        Self {
            config,
            transports,
            store: Arc::new(ReadingStore::new()),
            stats: Arc::new(IngestionStats::new()),
            services: service_manager(),
            input: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<IngestionStats> {
        &self.stats
    }

    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    /// HTTP state for this gateway's dashboard
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.store),
            Some(Arc::clone(&self.stats)),
            Arc::clone(&self.services),
        )
    }

    /// Declare the exchange, subscribe to raw input and start the services
    pub async fn start(&self) -> Result<()> {
        let topics = &self.config.topics;

        let direct = DirectSink::new(Arc::clone(&self.transports.pubsub), &topics.output_prefix);
        let bus = BusSink::new(
            Arc::clone(&self.transports.exchange),
            &topics.exchange,
            &topics.routing_key_prefix,
        );
        bus.declare().await?;

        let republisher = Arc::new(Republisher::new(
            Arc::new(direct),
            Arc::new(bus),
            self.config.ingestion.publish_timeout(),
        ));
        let listener = Arc::new(IngestionListener::new(
            CodecRegistry::new(),
            Arc::clone(&self.store),
            republisher,
            Arc::clone(&self.stats),
        ));

        let (tx, rx) = ingestion::channel(self.config.ingestion.channel_capacity);
        let subscription = self.transports.pubsub.subscribe(&topics.input_filter, tx).await?;
        *self.input.lock() = Some(subscription);

        self.services
            .register(Arc::new(ListenerService::new(listener, rx)))?;
        if self.config.aggregator.enabled {
            self.services.register(Arc::new(AggregatorService::new(
                "aggregator",
                Arc::clone(&self.store),
                self.config.aggregator.interval(),
            )))?;
        }
        self.services.start_all()?;

        info!(
            transport = self.transports.pubsub.name(),
            input = %topics.input_filter,
            output = %topics.output_prefix,
            exchange = %topics.exchange,
            "Gateway started"
        );
        Ok(())
    }

    /// Stop input, stop services and close transports
    pub async fn shutdown(&self) {
        if let Some(subscription) = self.input.lock().take() {
            subscription.cancel();
        }
        self.services.shutdown().await;
        self.transports.close().await;

        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            decoded = stats.decoded,
            decode_failures = stats.decode_failures.total,
            "Gateway stopped"
        );
    }
}

// =============================================================================
// Consumer node
// =============================================================================

/// Bus consumer with its own store and periodic dashboard
pub struct ConsumerNode {
    consumer: Arc<BusConsumer>,
    transports: Transports,
    services: Arc<ServiceManager>,
}

impl ConsumerNode {
    /// Validate the config, connect and build the consumer
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let transports = Transports::connect(&config.transport).await?;
        Self::with_transports(&config, transports)
    }

    /// Consumer over already connected transports
    pub fn with_transports(config: &GatewayConfig, transports: Transports) -> Result<Self> {
        let audit = match &config.consumer.audit_log {
            Some(path) => Some(AuditLog::open(path)?),
            None => None,
        };

        let binding = normalize_binding(&config.consumer.binding, &config.topics.routing_key_prefix);
        if binding != config.consumer.binding.trim() {
            warn!(
                requested = %config.consumer.binding,
                effective = %binding,
                "Binding placed under routing key prefix"
            );
        }

        let store = Arc::new(ReadingStore::new());
        let consumer = Arc::new(BusConsumer::new(
            Arc::clone(&transports.exchange),
            ConsumerSettings {
                exchange: config.topics.exchange.clone(),
                binding,
                channel_capacity: config.ingestion.channel_capacity,
            },
            Arc::clone(&store),
            audit,
        ));

        let services = service_manager();
        services.register(Arc::clone(&consumer) as Arc<dyn Service>)?;
        services.register(Arc::new(AggregatorService::new(
            "consumer-aggregator",
            store,
            config.consumer.interval(),
        )))?;

        Ok(Self {
            consumer,
            transports,
            services,
        })
    }

    pub fn consumer(&self) -> &Arc<BusConsumer> {
        &self.consumer
    }

    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    /// HTTP state for the consumer's dashboard
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(self.consumer.store()),
            None,
            Arc::clone(&self.services),
        )
    }

    pub fn start(&self) -> Result<()> {
        self.services.start_all()?;
        info!(binding = %self.consumer.binding(), "Consumer started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.services.shutdown().await;
        self.transports.close().await;
        info!(
            consumed = self.consumer.consumed(),
            rejected = self.consumer.rejected(),
            "Consumer stopped"
        );
    }
}
