//! Drone telemetry gateway binary
//!
//! # CLI Commands
//!
//! - `start` - Run the gateway and its dashboard (default if no command specified)
//! - `check-config` - Validate configuration and print a summary
//! - `consume` - Run a bus consumer with its own dashboard and audit log
//!
//! # Endpoints
//!
//! - `GET /dashboard` - Current dashboard text
//! - `GET /health` - Service health
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/stats` - Store and ingestion counters
//!
//! # Configuration
//!
//! Read from `--config`, then `GATEWAY_CONFIG`, then `./gateway.toml`,
//! otherwise defaults. `GATEWAY_*` variables and RUST_LOG override file values.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::load_config;
use drone_gateway::config::TransportBackend;
use drone_gateway::dashboard::{build_router, AppState};
use drone_gateway::transport::util::sanitize_url;
use drone_gateway::{metrics, ConsumerNode, Gateway};
use tokio::signal;
use tracing::{debug, info, warn};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "drone-gateway")]
#[command(version)]
#[command(about = "Telemetry gateway for regional drone sensor feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides GATEWAY_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the dashboard listen address (e.g., 0.0.0.0:8082)
    #[arg(short, long, global = true)]
    listen: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Start,

    /// Validate configuration without connecting to anything
    CheckConfig,

    /// Consume readings from the message bus
    Consume {
        /// Binding key, e.g. `#`, `norte` or `*.sul`
        #[arg(short, long)]
        binding: Option<String>,

        /// Append an audit line per consumed reading to this file
        #[arg(short, long)]
        audit_log: Option<PathBuf>,
    },
}

// =============================================================================
// Setup
// =============================================================================

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Graceful shutdown signal handler
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {},
            Err(e) => {
                warn!(error = %e, "Ctrl+C handler installation failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler installation failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

/// Serve the dashboard until a shutdown signal arrives
async fn serve_dashboard(
    listen_addr: &str,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard listening on http://{}/dashboard", addr);

    axum::serve(listener, build_router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn cmd_start(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, source) = load_config(cli.config.as_deref())?;
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }

    init_tracing(&config.server.log_level);
    metrics::init();
    info!("Starting drone gateway v{}", env!("CARGO_PKG_VERSION"));
    debug!(config = %source, listen_addr = %config.server.listen_addr, "Configuration loaded");

    let listen_addr = config.server.listen_addr.clone();
    let gateway = Gateway::connect(config).await?;
    gateway.start().await?;

    let served = serve_dashboard(&listen_addr, gateway.app_state()).await;
    gateway.shutdown().await;
    served?;

    info!("Gateway shutdown complete");
    Ok(())
}

async fn cmd_consume(
    cli: &Cli,
    binding: Option<&str>,
    audit_log: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, source) = load_config(cli.config.as_deref())?;
    if let Some(binding) = binding {
        config.consumer.binding = binding.to_string();
    }
    if audit_log.is_some() {
        config.consumer.audit_log = audit_log;
    }
    if let Some(listen) = &cli.listen {
        config.consumer.listen_addr = listen.clone();
    }

    init_tracing(&config.server.log_level);
    metrics::init();
    info!("Starting bus consumer v{}", env!("CARGO_PKG_VERSION"));
    debug!(config = %source, "Configuration loaded");

    if config.transport.backend == TransportBackend::Memory {
        warn!("Memory backend selected; this consumer only sees readings published in-process");
    }

    let listen_addr = config.consumer.listen_addr.clone();
    let node = ConsumerNode::connect(config).await?;
    node.start()?;

    let served = serve_dashboard(&listen_addr, node.app_state()).await;
    node.shutdown().await;
    served?;

    info!("Consumer shutdown complete");
    Ok(())
}

/// Validate configuration and print summary
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, source) = load_config(cli.config.as_deref())?;
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    config.validate()?;

    println!("Configuration is valid ({})", source);
    println!();
    println!("Server:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Log level: {}", config.server.log_level);
    println!();
    println!("Transport:");
    println!("  Backend: {:?}", config.transport.backend);
    println!("  URL: {}", sanitize_url(&config.transport.url));
    println!();
    println!("Topics:");
    println!("  Input filter: {}", config.topics.input_filter);
    println!("  Output prefix: {}", config.topics.output_prefix);
    println!("  Exchange: {}", config.topics.exchange);
    println!("  Routing key prefix: {}", config.topics.routing_key_prefix);
    println!();
    println!("Aggregator:");
    println!("  Enabled: {}", config.aggregator.enabled);
    println!("  Interval: {}s", config.aggregator.interval_secs);
    println!();
    println!("Consumer:");
    println!("  Binding: {}", config.consumer.binding);
    match &config.consumer.audit_log {
        Some(path) => println!("  Audit log: {}", path.display()),
        None => println!("  Audit log: disabled"),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => cmd_check_config(&cli),
        Some(Commands::Consume { binding, audit_log }) => {
            cmd_consume(&cli, binding.as_deref(), audit_log.clone()).await
        },
        Some(Commands::Start) | None => cmd_start(&cli).await,
    }
}
