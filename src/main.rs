//! Sticky path-hash HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                 LOAD BALANCER                 │
//!                       │                                               │
//!     Client Request    │  ┌─────────┐    ┌──────────────┐              │
//!     ──────────────────┼─▶│  http   │───▶│load_balancer │              │
//!                       │  │ server  │    │ path hash +  │              │
//!                       │  └─────────┘    │ ring probe   │              │
//!                       │                 └──────┬───────┘              │
//!                       │                        │ reads                │
//!                       │                 ┌──────▼───────┐              │
//!                       │                 │ health state │◀──┐          │
//!                       │                 └──────────────┘   │ writes   │
//!                       │                                    │          │
//!                       │                 ┌──────────────┐   │          │
//!                       │                 │ health check │───┘          │
//!                       │                 │ (1 per node) │──────────────┼──▶ GET /health
//!                       │                 └──────────────┘              │
//!     Client Response   │  ┌─────────┐    ┌──────────────┐              │
//!     ◀─────────────────┼──│ stream  │◀───│   forward    │◀─────────────┼──── Backend
//!                       │  └─────────┘    └──────────────┘              │
//!                       └───────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use sticky_balancer::config::{load_config, validate_config, BalancerConfig, ConfigError, UpstreamScheme};
use sticky_balancer::http::HttpServer;
use sticky_balancer::lifecycle::{wait_for_termination, Shutdown};
use sticky_balancer::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "sticky-balancer")]
#[command(about = "HTTP load balancer with sticky path-hash routing", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load balancer port
    #[arg(long)]
    port: Option<u16>,

    /// Request timeout time in seconds
    #[arg(long = "timeout-sec")]
    timeout_sec: Option<u64>,

    /// Whether backends support HTTPS
    #[arg(long)]
    https: bool,

    /// Whether to include tracing information into responses
    #[arg(long)]
    trace: bool,

    /// Backend address; repeat to build the pool in order
    #[arg(long = "backend", value_name = "HOST:PORT")]
    backends: Vec<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Resolve the effective configuration: file (or defaults), then flags.
    fn into_config(self) -> Result<BalancerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BalancerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(secs) = self.timeout_sec {
            config.timeouts.request_secs = secs;
        }
        if self.https {
            config.upstream.scheme = UpstreamScheme::Https;
        }
        if self.trace {
            config.observability.trace_header = true;
        }
        if !self.backends.is_empty() {
            config.backends = self.backends;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!("sticky-balancer v0.1.0 starting");
    tracing::info!(
        port = config.listener.port,
        backends = ?config.backends,
        request_timeout_secs = config.timeouts.request_secs,
        scheme = %config.upstream.scheme,
        "Configuration loaded"
    );
    tracing::info!(enabled = config.observability.trace_header, "Tracing support");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let grace = Duration::from_secs(config.lifecycle.shutdown_grace_secs);
    let server = HttpServer::new(config.clone())?;
    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting load balancer");

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.clone()));

    tokio::select! {
        _ = wait_for_termination() => {}
        joined = &mut server_task => {
            joined??;
            return Ok(());
        }
    }

    shutdown.trigger();
    match tokio::time::timeout(grace, server_task).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(grace = ?grace, "Server did not stop in time, exiting"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sticky-balancer").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.listener.port, 8090);
        assert_eq!(config.timeouts.request_secs, 3);
        assert_eq!(config.upstream.scheme, UpstreamScheme::Http);
        assert!(!config.observability.trace_header);
    }

    #[test]
    fn test_flags_override() {
        let config = parse(&[
            "--port",
            "9000",
            "--timeout-sec",
            "7",
            "--https",
            "--trace",
            "--backend",
            "a:1",
            "--backend",
            "b:2",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.timeouts.request_secs, 7);
        assert_eq!(config.upstream.scheme, UpstreamScheme::Https);
        assert!(config.observability.trace_header);
        assert_eq!(config.backends, vec!["a:1", "b:2"]);
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let err = parse(&["--timeout-sec", "0"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
