//! CLI command implementations
//!
//! `start` follows a fixed boot sequence: load config, install logging,
//! build the broker, start the sweeper, serve HTTP until Ctrl-C, then stop
//! the broker.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::broker::Broker;
use crate::http_server::HttpServer;
use crate::observability::{init_logging, Event};

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config, force } => init(&config, force),
        Command::Start { config, host, port } => start(&config, host, port),
        Command::Check { config } => check(&config),
    }
}

/// Write a default configuration file
pub fn init(config_path: &Path, force: bool) -> CliResult<()> {
    if config_path.exists() && !force {
        return Err(CliError::already_initialized(config_path));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                CliError::io_error(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let content = Config::default().to_json_pretty()?;
    fs::write(config_path, content).map_err(|e| {
        CliError::io_error(format!("Failed to write {}: {}", config_path.display(), e))
    })?;

    write_response(json!({
        "config": config_path.display().to_string(),
        "created": true,
    }))
}

/// Validate a configuration file and print the effective configuration
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_response(serde_json::to_value(&config)?)
}

/// Boot the broker and serve HTTP until interrupted
pub fn start(config_path: &Path, host: Option<String>, port: Option<u16>) -> CliResult<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(host) = host {
        config.http.host = host;
    }
    if let Some(port) = port {
        config.http.port = port;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    tracing::info!(
        event = %Event::BootStart,
        version = env!("CARGO_PKG_VERSION"),
        "starting aeromq"
    );
    tracing::info!(
        event = %Event::ConfigLoaded,
        config = %config_path.display(),
        found = config_path.exists(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async move {
        let broker = Broker::new(config.broker)?;
        broker.start()?;

        let server = HttpServer::with_config(broker.clone(), config.http);
        let served = server.start(shutdown_signal()).await;

        tracing::info!(event = %Event::ShutdownStart, "shutting down");
        broker.shutdown().await;
        tracing::info!(event = %Event::ShutdownComplete, "shutdown complete");

        served.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("aeromq.json");

        init(&path, false).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.http.port, 5002);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aeromq.json");
        fs::write(&path, "{}").unwrap();

        let err = init(&path, false).unwrap_err();
        assert_eq!(err.code_str(), "AERO_CLI_ALREADY_INITIALIZED");

        init(&path, true).unwrap();
    }

    #[test]
    fn test_check_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aeromq.json");
        fs::write(&path, r#"{"broker":{"sweep_interval_ms":0}}"#).unwrap();

        let err = check(&path).unwrap_err();
        assert_eq!(err.code_str(), "AERO_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_start_rejects_invalid_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = start(&path, Some("not a host".to_string()), None).unwrap_err();
        assert_eq!(err.code_str(), "AERO_CLI_CONFIG_ERROR");
    }
}
