//! Configuration management for the gateway
//!
//! TOML file with per-field defaults plus environment overrides:
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8082"
//!
//! [transport]
//! backend = "redis"
//! url = "redis://127.0.0.1:6379"
//!
//! [topics]
//! input_filter = "drones/#"
//! ```
//!
//! Every section and field may be omitted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::redis::RedisTransportConfig;
use crate::transport::topic::validate_filter;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// HTTP server and logging
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Dashboard listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Default tracing filter; RUST_LOG takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which transport implementation backs both sinks and the input subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// Redis pub/sub
    Redis,
    /// In-process broker
    Memory,
}

impl std::str::FromStr for TransportBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(TransportBackend::Redis),
            "memory" => Ok(TransportBackend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "unknown transport backend '{}', expected 'redis' or 'memory'",
                other
            ))),
        }
    }
}

/// Transport connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default = "default_backend")]
    pub backend: TransportBackend,

    /// Broker URL, used by the redis backend
    #[serde(default = "default_transport_url")]
    pub url: String,

    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// Topic names and routing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TopicsConfig {
    /// Filter for raw drone messages
    #[serde(default = "default_input_filter")]
    pub input_filter: String,

    /// Display-form topics are `{output_prefix}/{region}`
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Topic exchange receiving record-form readings
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Routing keys are `{routing_key_prefix}.{region}`
    #[serde(default = "default_routing_key_prefix")]
    pub routing_key_prefix: String,
}

/// Listener hand-off and publishing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Bounded channel between transport and listener
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Per-sink publish deadline
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

/// Periodic dashboard logging
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_aggregator_interval_secs")]
    pub interval_secs: u64,
}

/// Bus consumer mode
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Binding key; bare region names are placed under the routing key prefix
    #[serde(default = "default_binding")]
    pub binding: String,

    /// Audit log file; no audit log when unset
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// Dashboard period of the consumer's own aggregator
    #[serde(default = "default_consumer_interval_secs")]
    pub interval_secs: u64,

    /// Dashboard listen address in consumer mode
    #[serde(default = "default_consumer_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String { "0.0.0.0:8082".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_backend() -> TransportBackend { TransportBackend::Redis }
fn default_transport_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_connection_timeout_secs() -> u64 { 5 }
fn default_command_timeout_secs() -> u64 { 1 }
fn default_input_filter() -> String { "drones/#".to_string() }
fn default_output_prefix() -> String { "gateway/dados_processados".to_string() }
fn default_exchange() -> String { "gateway_dados_topic".to_string() }
fn default_routing_key_prefix() -> String { "dados".to_string() }
fn default_channel_capacity() -> usize { 1024 }
fn default_publish_timeout_ms() -> u64 { 2000 }
fn default_aggregator_interval_secs() -> u64 { 10 }
fn default_binding() -> String { "#".to_string() }
fn default_consumer_interval_secs() -> u64 { 15 }
fn default_consumer_listen_addr() -> String { "0.0.0.0:8083".to_string() }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_transport_url(),
            connection_timeout_secs: default_connection_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            input_filter: default_input_filter(),
            output_prefix: default_output_prefix(),
            exchange: default_exchange(),
            routing_key_prefix: default_routing_key_prefix(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_aggregator_interval_secs(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            binding: default_binding(),
            audit_log: None,
            interval_secs: default_consumer_interval_secs(),
            listen_addr: default_consumer_listen_addr(),
        }
    }
}

// =============================================================================
// Derived settings
// =============================================================================

impl TransportConfig {
    /// Redis settings for this section
    pub fn redis(&self) -> RedisTransportConfig {
        RedisTransportConfig::with_url(self.url.clone())
            .connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .command_timeout(Duration::from_secs(self.command_timeout_secs))
    }
}

impl IngestionConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl AggregatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ConsumerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Loading
// =============================================================================

impl GatewayConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable numeric or backend values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("GATEWAY_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(backend) = std::env::var("GATEWAY_TRANSPORT_BACKEND") {
            match backend.parse() {
                Ok(b) => self.transport.backend = b,
                Err(e) => tracing::warn!(error = %e, "Ignoring GATEWAY_TRANSPORT_BACKEND"),
            }
        }
        if let Ok(url) = std::env::var("GATEWAY_TRANSPORT_URL") {
            self.transport.url = url;
        }

        if let Ok(secs) = std::env::var("GATEWAY_AGGREGATOR_INTERVAL_SECS") {
            match secs.parse() {
                Ok(s) => self.aggregator.interval_secs = s,
                Err(_) => tracing::warn!(value = %secs, "Ignoring GATEWAY_AGGREGATOR_INTERVAL_SECS"),
            }
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.server.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (section, addr) in [
            ("server", &self.server.listen_addr),
            ("consumer", &self.consumer.listen_addr),
        ] {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return invalid(format!(
                    "{} listen address '{}' is not a socket address",
                    section, addr
                ));
            }
        }

        if self.transport.backend == TransportBackend::Redis {
            self.transport.redis().validate().map_err(ConfigError::Invalid)?;
        }

        validate_filter(&self.topics.input_filter)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.topics.output_prefix.is_empty() {
            return invalid("output prefix cannot be empty".to_string());
        }
        if self.topics.exchange.is_empty() {
            return invalid("exchange name cannot be empty".to_string());
        }

        if self.ingestion.channel_capacity == 0 {
            return invalid("ingestion channel capacity must be > 0".to_string());
        }
        if self.ingestion.publish_timeout_ms == 0 {
            return invalid("publish timeout must be > 0".to_string());
        }

        if self.aggregator.enabled && self.aggregator.interval_secs == 0 {
            return invalid("aggregator interval must be > 0".to_string());
        }
        if self.consumer.interval_secs == 0 {
            return invalid("consumer interval must be > 0".to_string());
        }
        if self.consumer.binding.trim().is_empty() {
            return invalid("consumer binding cannot be empty".to_string());
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8082");
        assert_eq!(config.transport.backend, TransportBackend::Redis);
        assert_eq!(config.topics.input_filter, "drones/#");
        assert_eq!(config.topics.exchange, "gateway_dados_topic");
        assert_eq!(config.aggregator.interval(), Duration::from_secs(10));
        assert_eq!(config.consumer.interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [transport]
            backend = "memory"

            [aggregator]
            interval_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.backend, TransportBackend::Memory);
        assert_eq!(config.transport.url, "redis://127.0.0.1:6379");
        assert_eq!(config.aggregator.interval_secs, 3);
        assert!(config.aggregator.enabled);
        assert_eq!(config.ingestion.channel_capacity, 1024);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = GatewayConfig::default();
        config.ingestion.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.topics.input_filter = "drones/#/x".to_string();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.server.listen_addr = "nowhere".to_string();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.consumer.listen_addr = "localhost".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("consumer listen address"));

        let mut config = GatewayConfig::default();
        config.transport.url = "http://localhost".to_string();
        assert!(config.validate().is_err());
        config.transport.backend = TransportBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("MEMORY".parse::<TransportBackend>().unwrap(), TransportBackend::Memory);
        assert!("amqp".parse::<TransportBackend>().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");

        let mut config = GatewayConfig::default();
        config.consumer.audit_log = Some(dir.path().join("audit.log"));
        config.save_to_file(&path).unwrap();

        assert_eq!(GatewayConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::from_file("/nonexistent/gateway.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("GATEWAY_LISTEN_ADDR", "127.0.0.1:9999");
        std::env::set_var("GATEWAY_TRANSPORT_BACKEND", "memory");
        let config = GatewayConfig::from_env();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.transport.backend, TransportBackend::Memory);
        std::env::remove_var("GATEWAY_LISTEN_ADDR");
        std::env::remove_var("GATEWAY_TRANSPORT_BACKEND");
    }
}
