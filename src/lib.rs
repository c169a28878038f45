//! Drone telemetry gateway
//!
//! Field drones publish environmental readings in a per-region text format.
//! The gateway:
//! - decodes every regional wire format into one canonical [`types::Reading`]
//! - republishes each reading to a pub/sub topic and a topic exchange,
//!   handling each sink's failures independently
//! - keeps a region-partitioned in-memory store
//! - renders periodic dashboards (distribution, averages, rankings)
//!
//! A bus consumer mode rebuilds the same dashboards from the exchange side.

#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod store;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Pub/sub and topic exchange transports (memory and Redis)
pub mod transport;

/// Concurrent fan-out of readings to the downstream sinks
pub mod republish;

/// Raw message listener feeding the store and the republisher
pub mod ingestion;

/// Snapshot statistics and dashboard rendering
pub mod aggregation;

/// Exchange-side consumer with audit log
pub mod consumer;

/// Background service lifecycle and graceful shutdown
pub mod services;

/// HTTP dashboard, health and metrics endpoints
pub mod dashboard;

/// Component wiring for the gateway and consumer processes
pub mod gateway;

// Re-export main types
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::{ConsumerNode, Gateway, Transports};
pub use types::{Metric, Reading, Region};
