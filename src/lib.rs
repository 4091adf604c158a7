//! TextSwift orchestration core: request brokering with caching and
//! fallback, the native subprocess bridge, latency benchmarking, and the
//! framed stdio host that exposes it all over native messaging.

pub mod error;
pub mod protocol;
pub mod config;
pub mod framing;
pub mod logger;
pub mod settings;
pub mod bridge;
pub mod broker;
pub mod bench;
pub mod host;

use std::sync::Arc;

use tracing::info;

use config::HostConfig;
use host::HostService;
use logger::{EventLog, LOG_ROTATE_BYTES};

/// Bootstrap the framed stdio host: configuration from the environment,
/// tracing to stderr (stdout carries frames), then serve until EOF.
pub async fn run_host() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "textswift=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::from_env();
    info!(mode = config.mode().as_str(), "textswift host starting");

    let log = Arc::new(EventLog::new(config.log_path.clone(), LOG_ROTATE_BYTES));
    let service = HostService::from_config(&config, log);
    service.run(tokio::io::stdin(), tokio::io::stdout()).await
}
