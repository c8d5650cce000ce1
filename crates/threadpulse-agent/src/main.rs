//! Agent binary for the threadpulse active thread count feed.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`THREADPULSE_CONFIG`, default `threadpulse.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the active trace repository with the configured schema
//! 4. Create the active thread count service
//! 5. Spawn the Observer API server
//! 6. Wait for Ctrl-C, then close the service and stop the server

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use threadpulse_core::config::LoggingConfig;
use threadpulse_core::{ActiveThreadCountService, ActiveTraceRepository, PulseConfig};
use threadpulse_observer::server::ServerConfig;
use threadpulse_observer::startup::spawn_observer;
use threadpulse_observer::state::AppState;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AgentError;

/// Config file used when `THREADPULSE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "threadpulse.yaml";

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    let config_path = config_path_from(|key| std::env::var(key).ok());
    let config = PulseConfig::from_file_or_default(&config_path)?;

    init_tracing(&config.logging);
    info!(
        path = %config_path.display(),
        flush_interval_ms = config.stream.flush_interval_ms,
        channel_buffer = config.stream.channel_buffer,
        schema = %config.histogram.schema,
        "Configuration loaded"
    );

    let repository = Arc::new(ActiveTraceRepository::new(config.histogram.resolve()));
    let service = Arc::new(ActiveThreadCountService::from_config(
        repository,
        &config.stream,
    )?);
    info!(command = service.command_type().code(), "active thread count service ready");

    let state = Arc::new(
        AppState::new(Arc::clone(&service)).with_channel_buffer(config.stream.channel_buffer),
    );
    let shutdown = CancellationToken::new();
    let observer = spawn_observer(
        &ServerConfig::from(&config.observer),
        state,
        shutdown.clone(),
    )
    .await?;
    info!(addr = %observer.local_addr, "Observer API server started");

    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AgentError::Signal { source })?;
    info!("shutdown signal received");

    service.close();
    shutdown.cancel();
    if let Err(e) = observer.task.await {
        warn!(error = %e, "observer task ended abnormally");
    }

    info!(
        activations = service.activation_count(),
        "threadpulse-agent shutdown complete"
    );
    Ok(())
}

/// Resolve the config file path from `THREADPULSE_CONFIG`.
fn config_path_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("THREADPULSE_CONFIG")
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_when_unset() {
        assert_eq!(config_path_from(|_| None), PathBuf::from("threadpulse.yaml"));
    }

    #[test]
    fn config_path_defaults_when_blank() {
        assert_eq!(
            config_path_from(|_| Some(String::from("  "))),
            PathBuf::from("threadpulse.yaml")
        );
    }

    #[test]
    fn config_path_from_environment() {
        let path = config_path_from(|key| {
            (key == "THREADPULSE_CONFIG").then(|| String::from("/etc/threadpulse/agent.yaml"))
        });
        assert_eq!(path, PathBuf::from("/etc/threadpulse/agent.yaml"));
    }
}
