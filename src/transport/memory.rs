//! In-process broker
//!
//! Implements both [`PubSub`] and [`TopicExchange`] with plain route tables.
//! Publishing walks the matching routes and hands the message to each
//! subscriber channel with `try_send`; a full channel loses the message and
//! a closed one is pruned. Used for single-process deployments and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use super::topic::{binding_matches, filter_matches, validate_filter};
use super::{InboundMessage, PubSub, Subscription, TopicExchange, TransportError, TransportResult};

struct Route {
    id: u64,
    /// Exchange name, `None` for pub/sub routes
    exchange: Option<String>,
    pattern: String,
    tx: mpsc::Sender<InboundMessage>,
}

#[derive(Default)]
struct BrokerState {
    routes: RwLock<Vec<Route>>,
    exchanges: RwLock<HashSet<String>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl BrokerState {
    fn add_route(
        self: &Arc<Self>,
        exchange: Option<String>,
        pattern: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let description = match &exchange {
            Some(ex) => format!("memory exchange {} binding {}", ex, pattern),
            None => format!("memory filter {}", pattern),
        };

        self.routes.write().push(Route {
            id,
            exchange,
            pattern: pattern.to_string(),
            tx,
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(description, move || {
            if let Some(state) = weak.upgrade() {
                state.routes.write().retain(|r| r.id != id);
            }
        })
    }

    /// Deliver to every matching route; returns the number of receivers
    fn deliver(&self, exchange: Option<&str>, key: &str, payload: &Bytes) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let routes = self.routes.read();
            for route in routes.iter() {
                let matches = match (exchange, route.exchange.as_deref()) {
                    (None, None) => filter_matches(&route.pattern, key),
                    (Some(ex), Some(route_ex)) if ex == route_ex => {
                        binding_matches(&route.pattern, key)
                    },
                    _ => false,
                };
                if !matches {
                    continue;
                }

                match route.tx.try_send(InboundMessage::new(key, payload.clone())) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(pattern = %route.pattern, key, "Subscriber channel full, message dropped");
                    },
                    Err(TrySendError::Closed(_)) => closed.push(route.id),
                }
            }
        }

        if !closed.is_empty() {
            self.routes.write().retain(|r| !closed.contains(&r.id));
        }
        delivered
    }
}

/// Shared in-process broker
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
    connected: Arc<AtomicBool>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a connected, empty broker
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState::default()),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate a lost connection; publishes fail until `reconnect`
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Restore the connection
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Number of active routes (pub/sub and exchange)
    pub fn route_count(&self) -> usize {
        self.state.routes.read().len()
    }

    /// Messages lost to full subscriber channels
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    fn ensure_declared(&self, exchange: &str) -> TransportResult<()> {
        if self.state.exchanges.read().contains(exchange) {
            Ok(())
        } else {
            Err(TransportError::ExchangeNotDeclared(exchange.to_string()))
        }
    }
}

#[async_trait]
impl PubSub for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> TransportResult<()> {
        self.ensure_connected()?;
        let receivers = self.state.deliver(None, topic, &payload);
        debug!(topic, receivers, "Published");
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> TransportResult<Subscription> {
        self.ensure_connected()?;
        validate_filter(filter)?;
        Ok(self.state.add_route(None, filter, tx))
    }

    async fn close(&self) {
        self.disconnect();
    }
}

#[async_trait]
impl TopicExchange for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn declare(&self, exchange: &str) -> TransportResult<()> {
        self.ensure_connected()?;
        self.state.exchanges.write().insert(exchange.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> TransportResult<()> {
        self.ensure_connected()?;
        self.ensure_declared(exchange)?;
        let receivers = self.state.deliver(Some(exchange), routing_key, &payload);
        debug!(exchange, routing_key, receivers, "Published to exchange");
        Ok(())
    }

    async fn bind(
        &self,
        exchange: &str,
        binding: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> TransportResult<Subscription> {
        self.ensure_connected()?;
        self.ensure_declared(exchange)?;
        Ok(self
            .state
            .add_route(Some(exchange.to_string()), binding, tx))
    }

    async fn close(&self) {
        self.disconnect();
    }
}
