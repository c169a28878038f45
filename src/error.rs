//! Error types for the gateway
//!
//! Each concern owns its own error enum; [`Error`] unifies them for the
//! wiring layer and the binary.

use thiserror::Error;

pub use crate::codec::DecodeError;
pub use crate::config::ConfigError;
pub use crate::republish::sink::SinkError;
pub use crate::services::ServiceError;
pub use crate::transport::TransportError;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    /// Raw message could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Transport connection or delivery failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A downstream sink rejected a reading
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Background service failed
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using the gateway [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
