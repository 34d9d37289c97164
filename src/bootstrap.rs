//! Startup plumbing shared by the service binaries: config resolution,
//! tracing, the coordination fabric and the shutdown signal.

use crate::config::{Config, LogFormat};
use crate::fabric::{ChannelOptions, CoordClient, Registry, ServiceManager};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
pub fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

/// Load the config, install tracing and validate. Every validation error is
/// logged before the process gives up.
pub fn load_config() -> anyhow::Result<Config> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = crate::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        anyhow::bail!("configuration validation failed with {} error(s)", errors.len());
    }

    info!(
        service = %config.server.service_name,
        instance = %config.server.instance_name,
        addr = %config.server.advertised_addr(),
        "starting"
    );
    Ok(config)
}

/// Per-call RPC options from the config surface.
pub fn channel_options(config: &Config) -> ChannelOptions {
    ChannelOptions::from_config(config.server.rpc_timeout_ms, config.server.rpc_max_retry)
}

/// Connect the coordination store and publish this instance under its lease.
pub async fn register_instance(config: &Config) -> anyhow::Result<(CoordClient, Registry)> {
    let coord = CoordClient::connect(&config.coord.endpoints).await?;
    let registry = Registry::new(
        &config.server.service_name,
        coord.clone(),
        config.coord.lease_ttl,
    )
    .await?;
    registry
        .register(
            &config.server.instance_name,
            &config.server.advertised_addr(),
        )
        .await?;
    Ok((coord, registry))
}

/// A manager focused on the given upstream services, wired for discovery.
pub fn focused_manager(config: &Config, services: &[&str]) -> Arc<ServiceManager> {
    let manager = Arc::new(ServiceManager::new(channel_options(config)));
    for service in services {
        manager.declare(service);
    }
    manager
}

/// Start the optional Prometheus endpoint. Port 0 (or absent) disables it.
pub fn spawn_metrics(config: &Config) {
    let port = config.server.metrics_port.unwrap_or(0);
    if port == 0 {
        info!("metrics disabled");
        return;
    }
    crate::metrics::init();
    tokio::spawn(async move {
        crate::http::run_metrics_server(port).await;
    });
    info!(port, "metrics initialized");
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT - shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM - shutting down"),
    }
}
