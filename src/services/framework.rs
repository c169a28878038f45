//! Service framework
//!
//! Long-running gateway tasks (the ingestion listener, the periodic
//! aggregators, the bus consumer) implement [`Service`] and are driven by a
//! [`ServiceManager`]:
//!
//! ```text
//!  ServiceManager ──register──► [listener] [aggregator] [consumer] ...
//!        │
//!        ├── start_all(): spawn each service with a shutdown receiver
//!        │
//!        └── shutdown():  broadcast () ──► every service returns
//!                         await tasks until shutdown_timeout, then abort
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// Service Trait
// ============================================================================

/// A background task with a cooperative shutdown signal
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run until the shutdown receiver fires
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Name used for logging and status reporting
    fn name(&self) -> &'static str;

    /// Current status
    fn status(&self) -> ServiceStatus;
}

// ============================================================================
// Service Status
// ============================================================================

/// Lifecycle state of a service
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Registered but not yet running
    Starting,

    /// Running normally
    Running,

    /// Stopped cleanly
    Stopped,

    /// Returned an error or panicked
    Failed(String),
}

impl ServiceStatus {
    /// Running normally
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

/// Shared status slot a service updates as it moves through its lifecycle
#[derive(Debug)]
pub struct StatusCell(RwLock<ServiceStatus>);

impl Default for StatusCell {
    fn default() -> Self {
        Self(RwLock::new(ServiceStatus::Starting))
    }
}

impl StatusCell {
    /// Replace the current status
    pub fn set(&self, status: ServiceStatus) {
        *self.0.write() = status;
    }

    /// Current status
    pub fn get(&self) -> ServiceStatus {
        self.0.read().clone()
    }
}

// ============================================================================
// Service Error
// ============================================================================

/// Errors raised by services and the manager
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Service could not set itself up
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    /// A service with this name is already registered
    #[error("Service already registered: {0}")]
    AlreadyRegistered(&'static str),

    /// `start_all` called twice
    #[error("Services already running")]
    AlreadyRunning,
}

// ============================================================================
// Service Config
// ============================================================================

/// Settings for the service manager
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on waiting for services to stop
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Service Manager
// ============================================================================

struct ServiceHandle {
    service: Arc<dyn Service>,
    task: Option<JoinHandle<Result<(), ServiceError>>>,
    started_at: Option<Instant>,
    /// Set by the manager when `start` returns an error; overrides the service's own status
    failure: Arc<RwLock<Option<String>>>,
}

impl ServiceHandle {
    fn status(&self) -> ServiceStatus {
        match self.failure.read().as_ref() {
            Some(reason) => ServiceStatus::Failed(reason.clone()),
            None => self.service.status(),
        }
    }
}

/// Starts registered services and stops them on shutdown
pub struct ServiceManager {
    config: ServiceConfig,
    /// Registration order is start order
    services: RwLock<Vec<ServiceHandle>>,
    shutdown_tx: broadcast::Sender<()>,
    running: RwLock<bool>,
}

impl ServiceManager {
    /// Create a manager
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            services: RwLock::new(Vec::new()),
            shutdown_tx,
            running: RwLock::new(false),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServiceConfig::default())
    }

    /// Register a service; names must be unique
    pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceError> {
        let name = service.name();
        let mut services = self.services.write();
        if services.iter().any(|h| h.service.name() == name) {
            return Err(ServiceError::AlreadyRegistered(name));
        }
        services.push(ServiceHandle {
            service,
            task: None,
            started_at: None,
            failure: Arc::new(RwLock::new(None)),
        });
        tracing::debug!(service = name, "Service registered");
        Ok(())
    }

    /// Spawn every registered service in registration order
    pub fn start_all(&self) -> Result<(), ServiceError> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(ServiceError::AlreadyRunning);
            }
            *running = true;
        }

        let mut services = self.services.write();
        for handle in services.iter_mut() {
            let service = Arc::clone(&handle.service);
            let failure = Arc::clone(&handle.failure);
            let shutdown_rx = self.shutdown_tx.subscribe();
            handle.task = Some(tokio::spawn(async move {
                let result = service.start(shutdown_rx).await;
                if let Err(ref e) = result {
                    tracing::error!(service = service.name(), error = %e, "Service failed");
                    *failure.write() = Some(e.to_string());
                }
                result
            }));
            handle.started_at = Some(Instant::now());
            tracing::debug!(service = handle.service.name(), "Service started");
        }
        Ok(())
    }

    /// Signal shutdown and wait for services, bounded by the shutdown timeout
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());

        type Task = JoinHandle<Result<(), ServiceError>>;
        let tasks: Vec<(&'static str, Task, Arc<RwLock<Option<String>>>)> = {
            let mut services = self.services.write();
            services
                .iter_mut()
                .filter_map(|h| {
                    let failure = Arc::clone(&h.failure);
                    h.task.take().map(|task| (h.service.name(), task, failure))
                })
                .collect()
        };

        let deadline = Instant::now() + self.config.shutdown_timeout;
        for (name, mut task, failure) in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(service = name, "Service stopped gracefully");
                },
                Ok(Ok(Err(e))) => {
                    tracing::debug!(service = name, error = %e, "Service had already failed");
                },
                Ok(Err(e)) => {
                    tracing::error!(service = name, error = %e, "Service task panicked");
                    *failure.write() = Some(format!("panicked: {}", e));
                },
                Err(_) => {
                    tracing::warn!(service = name, "Service shutdown timed out, aborting");
                    task.abort();
                },
            }
        }

        *self.running.write() = false;
        tracing::info!("Shutdown complete");
    }

    /// Status of every service in registration order
    pub fn status(&self) -> Vec<(&'static str, ServiceStatus)> {
        self.services
            .read()
            .iter()
            .map(|h| (h.service.name(), h.status()))
            .collect()
    }

    /// Time since a service was started
    pub fn service_uptime(&self, name: &str) -> Option<Duration> {
        self.services
            .read()
            .iter()
            .find(|h| h.service.name() == name)
            .and_then(|h| h.started_at.map(|s| s.elapsed()))
    }

    /// All services running
    pub fn is_healthy(&self) -> bool {
        self.services
            .read()
            .iter()
            .all(|h| h.status().is_healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Idle {
        name: &'static str,
        status: StatusCell,
        stopped: AtomicBool,
    }

    impl Idle {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                status: StatusCell::default(),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl Service for Idle {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            self.status.set(ServiceStatus::Running);
            let _ = shutdown.recv().await;
            self.stopped.store(true, Ordering::SeqCst);
            self.status.set(ServiceStatus::Stopped);
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn status(&self) -> ServiceStatus {
            self.status.get()
        }
    }

    struct Stubborn;

    #[async_trait::async_trait]
    impl Service for Stubborn {
        async fn start(&self, _shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stubborn"
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Running
        }
    }

    struct Refused;

    #[async_trait::async_trait]
    impl Service for Refused {
        async fn start(&self, _shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            Err(ServiceError::InitializationFailed("bind refused".into()))
        }

        fn name(&self) -> &'static str {
            "refused"
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Starting
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let manager = ServiceManager::with_defaults();
        manager.register(Idle::new("a")).unwrap();
        let err = manager.register(Idle::new("a")).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRegistered("a")));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let manager = ServiceManager::with_defaults();
        let a = Idle::new("a");
        let b = Idle::new("b");
        manager.register(a.clone()).unwrap();
        manager.register(b.clone()).unwrap();

        manager.start_all().unwrap();
        assert!(matches!(manager.start_all(), Err(ServiceError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_healthy());
        assert!(manager.service_uptime("a").is_some());

        manager.shutdown().await;
        assert!(a.stopped.load(Ordering::SeqCst));
        assert!(b.stopped.load(Ordering::SeqCst));
        assert_eq!(
            manager.status(),
            vec![("a", ServiceStatus::Stopped), ("b", ServiceStatus::Stopped)]
        );
    }

    #[tokio::test]
    async fn test_shutdown_timeout_aborts() {
        let manager = ServiceManager::new(ServiceConfig {
            shutdown_timeout: Duration::from_millis(50),
        });
        manager.register(Arc::new(Stubborn)).unwrap();
        manager.start_all().unwrap();

        let started = std::time::Instant::now();
        manager.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_start_error_marks_service_failed() {
        let manager = ServiceManager::with_defaults();
        let healthy = Idle::new("healthy");
        manager.register(healthy.clone()).unwrap();
        manager.register(Arc::new(Refused)).unwrap();
        manager.start_all().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = manager.status();
        assert_eq!(status[0], ("healthy", ServiceStatus::Running));
        match &status[1] {
            ("refused", ServiceStatus::Failed(reason)) => assert!(reason.contains("bind refused")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!manager.is_healthy());

        manager.shutdown().await;
        assert!(matches!(manager.status()[1].1, ServiceStatus::Failed(_)));
        assert_eq!(manager.status()[0].1, ServiceStatus::Stopped);
    }
}
