//! Background services
//!
//! Every long-running gateway task implements [`Service`] and is driven by a
//! [`ServiceManager`], which owns the shutdown broadcast.
//!
//! # Example
//!
//! ```rust
//! use drone_gateway::services::{ServiceConfig, ServiceManager};
//!
//! let manager = ServiceManager::new(ServiceConfig::default());
//! assert!(manager.status().is_empty());
//! ```

pub mod framework;

pub use framework::{
    Service, ServiceConfig, ServiceError, ServiceManager, ServiceStatus, StatusCell,
};
