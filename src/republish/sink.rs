//! Outbound sinks
//!
//! A sink encodes a reading in its canonical form and hands it to one
//! transport. Sinks never retry; a transport that reports itself
//! disconnected fails fast with [`SinkError::Unavailable`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::codec::canonical::{encode_display, encode_record};
use crate::transport::{PubSub, TopicExchange, TransportError};
use crate::types::{Reading, Region};

/// Per-sink publish failures
#[derive(Error, Debug)]
pub enum SinkError {
    /// Transport is not connected; nothing was attempted
    #[error("Sink '{0}' unavailable: transport not connected")]
    Unavailable(&'static str),

    /// Transport rejected or failed the publish
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Record could not be serialized
    #[error("Record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Publish did not finish within the sink timeout
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// The publish task panicked
    #[error("Publish task panicked: {0}")]
    Panicked(String),
}

/// One outbound destination for canonical readings
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name used in logs and metrics labels
    fn name(&self) -> &'static str;

    /// Encode and publish one reading
    async fn send(&self, reading: &Reading) -> Result<(), SinkError>;
}

// ============================================================================
// Direct pub/sub sink
// ============================================================================

/// Publishes the display form to `{prefix}/{region}`
pub struct DirectSink {
    transport: Arc<dyn PubSub>,
    prefix: String,
}

impl DirectSink {
    /// Sink publishing under `prefix` (e.g. `gateway/dados_processados`)
    pub fn new(transport: Arc<dyn PubSub>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Output topic for a region
    pub fn topic_for(&self, region: Region) -> String {
        format!("{}/{}", self.prefix, region)
    }
}

#[async_trait]
impl Sink for DirectSink {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn send(&self, reading: &Reading) -> Result<(), SinkError> {
        if !self.transport.is_connected() {
            return Err(SinkError::Unavailable(self.name()));
        }
        let topic = self.topic_for(reading.region());
        self.transport
            .publish(&topic, Bytes::from(encode_display(reading)))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Message bus sink
// ============================================================================

/// Routing key for a region: `{prefix}.{region}`, or the bare region
pub fn routing_key(prefix: &str, region: Region) -> String {
    if prefix.is_empty() {
        region.as_str().to_string()
    } else {
        format!("{}.{}", prefix, region)
    }
}

/// Publishes the record form to a topic exchange
pub struct BusSink {
    transport: Arc<dyn TopicExchange>,
    exchange: String,
    routing_key_prefix: String,
}

impl BusSink {
    /// Sink publishing to `exchange` with keys `{routing_key_prefix}.{region}`
    pub fn new(
        transport: Arc<dyn TopicExchange>,
        exchange: impl Into<String>,
        routing_key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
            routing_key_prefix: routing_key_prefix.into(),
        }
    }

    /// Declare the exchange; call once at startup
    pub async fn declare(&self) -> Result<(), TransportError> {
        self.transport.declare(&self.exchange).await
    }
}

#[async_trait]
impl Sink for BusSink {
    fn name(&self) -> &'static str {
        "bus"
    }

    async fn send(&self, reading: &Reading) -> Result<(), SinkError> {
        if !self.transport.is_connected() {
            return Err(SinkError::Unavailable(self.name()));
        }
        let key = routing_key(&self.routing_key_prefix, reading.region());
        let record = encode_record(reading)?;
        self.transport
            .publish(&self.exchange, &key, Bytes::from(record))
            .await?;
        Ok(())
    }
}
