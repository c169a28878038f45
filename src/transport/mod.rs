//! Transport abstractions
//!
//! The gateway talks to two kinds of broker:
//!
//! ```text
//!                    ┌────────────────────────────┐
//!  drones/{region}/… │ PubSub                     │ gateway/dados_processados/{region}
//!  ─────────────────►│  topic filters: + and #    │──────────────────────────────────►
//!                    └────────────────────────────┘
//!                    ┌────────────────────────────┐
//!                    │ TopicExchange              │ gateway_dados_topic, dados.{region}
//!                    │  binding keys: * and #     │──────────────────────────────────►
//!                    └────────────────────────────┘
//! ```
//!
//! Inbound messages are pushed by a transport-owned pump into a bounded
//! `mpsc` channel supplied by the caller. Dropping or cancelling the
//! returned [`Subscription`] stops delivery. Delivery is fire-and-forget: a
//! full channel drops the message.
//!
//! Two backends are provided: an in-process broker ([`memory`]) and a Redis
//! backed one ([`redis`]).

pub mod memory;
pub mod redis;
pub mod topic;
pub mod util;

pub use self::memory::MemoryBroker;
pub use self::redis::{RedisTransport, RedisTransportConfig};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Transport-level errors
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The broker connection is currently down
    #[error("Transport disconnected")]
    Disconnected,

    /// Establishing the connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Publish or bind against an exchange that was never declared
    #[error("Exchange not declared: {0}")]
    ExchangeNotDeclared(String),

    /// Malformed topic filter or binding key
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// Redis backend error (message is credential-safe)
    #[error("Redis error: {0}")]
    Redis(String),

    /// Operation did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// One message delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic (pub/sub) or routing key (exchange) the message arrived on
    pub topic: String,
    /// Raw body
    pub payload: Bytes,
}

impl InboundMessage {
    /// Build a message from anything convertible to bytes
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Body as UTF-8, replacing invalid sequences
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

// ============================================================================
// Subscription handle
// ============================================================================

/// Handle to an active subscription
///
/// Delivery stops when the handle is cancelled or dropped.
pub struct Subscription {
    description: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Subscription stopped by running `cancel`
    pub fn new(description: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            description: description.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription backed by a pump task that is aborted on cancel
    pub fn from_task(description: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self::new(description, move || task.abort())
    }

    /// What this subscription listens to
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stop delivery
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("description", &self.description)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Direct publish/subscribe transport with hierarchical topics
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether the broker connection is currently up
    fn is_connected(&self) -> bool;

    /// Publish one message, fire-and-forget
    async fn publish(&self, topic: &str, payload: Bytes) -> TransportResult<()>;

    /// Deliver every message whose topic matches `filter` into `tx`
    async fn subscribe(
        &self,
        filter: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> TransportResult<Subscription>;

    /// Release the connection; later publishes fail with `Disconnected`
    async fn close(&self);
}

/// Topic-routed message bus
#[async_trait]
pub trait TopicExchange: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether the broker connection is currently up
    fn is_connected(&self) -> bool;

    /// Declare a topic exchange; idempotent
    async fn declare(&self, exchange: &str) -> TransportResult<()>;

    /// Publish one message with a routing key, fire-and-forget
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes)
        -> TransportResult<()>;

    /// Deliver every message whose routing key matches `binding` into `tx`
    async fn bind(
        &self,
        exchange: &str,
        binding: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> TransportResult<Subscription>;

    /// Release the connection
    async fn close(&self);
}
