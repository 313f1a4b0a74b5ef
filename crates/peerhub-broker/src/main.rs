//! peerhub broker — entry point.
//!
//! The broker is the control plane for account-scoped device discovery: it
//! verifies identity claims at connect time, tracks live sessions per
//! fingerprint, and relays small control frames between sibling devices so
//! they can establish a direct data channel elsewhere.
//!
//! # Usage
//!
//! ```text
//! peerhub-broker [OPTIONS]
//!
//! Options:
//!   --ws-addr <ADDR>            Session (WebSocket) listen address [default: 0.0.0.0:17777]
//!   --http-addr <ADDR>          Facade (HTTP) listen address [default: 0.0.0.0:17778]
//!   --pong-timeout <SECS>       Read deadline between pongs [default: 60]
//!   --write-timeout <SECS>      Per-send write deadline [default: 10]
//!   --max-frame-bytes <BYTES>   Maximum inbound frame size [default: 512]
//!   --config <PATH>             Optional TOML config file
//! ```
//!
//! Every flag can also come from a `PEERHUB_*` environment variable; CLI
//! arguments win over the config file, which wins over the defaults.
//!
//! # Process layout
//!
//! One hub task consumes the serialized event queue; one accept loop feeds
//! it sessions over WebSocket; the axum facade serves the verification API.
//! Ctrl+C clears a shared flag, both listeners stop accepting, in-flight
//! sessions drain, and the hub loop ends once the last producer handle is
//! dropped.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use peerhub_broker::application::directory::Directory;
use peerhub_broker::application::hub::Hub;
use peerhub_broker::domain::config::{BrokerConfig, ConfigFile};
use peerhub_broker::infrastructure::{
    run_http_server, run_ws_server, ApiState, LogNotifier, MemoryStore,
};
use peerhub_core::notifier::VerificationNotifier;
use peerhub_core::store::IdentityStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// peerhub control-plane broker.
///
/// Accepts WebSocket sessions from devices, verifies their identity claims,
/// and relays control frames between devices of the same account.
#[derive(Debug, Parser)]
#[command(
    name = "peerhub-broker",
    about = "Identity, presence, and message-routing plane for peerhub devices",
    version
)]
struct Cli {
    /// Session (WebSocket) listen address.
    #[arg(long, env = "PEERHUB_WS_ADDR")]
    ws_addr: Option<SocketAddr>,

    /// Facade (HTTP) listen address.
    #[arg(long, env = "PEERHUB_HTTP_ADDR")]
    http_addr: Option<SocketAddr>,

    /// Seconds a session may go without a pong before its read deadline
    /// expires. The keepalive ping period is always 9/10 of this window.
    #[arg(long, env = "PEERHUB_PONG_TIMEOUT")]
    pong_timeout: Option<u64>,

    /// Seconds allowed for a single socket write.
    #[arg(long, env = "PEERHUB_WRITE_TIMEOUT")]
    write_timeout: Option<u64>,

    /// Maximum inbound frame size in bytes; larger input terminates the
    /// connection.
    #[arg(long, env = "PEERHUB_MAX_FRAME_BYTES")]
    max_frame_bytes: Option<usize>,

    /// Optional TOML config file; CLI arguments take precedence over it.
    #[arg(long, env = "PEERHUB_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Resolves defaults, config file, and CLI flags into a validated
    /// [`BrokerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error for an unreadable/malformed config file or settings
    /// that fail validation.
    fn into_broker_config(self) -> anyhow::Result<BrokerConfig> {
        let base = BrokerConfig::default();
        let base = match &self.config {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?
                .apply(base),
            None => base,
        };

        let config = BrokerConfig {
            ws_bind_addr: self.ws_addr.unwrap_or(base.ws_bind_addr),
            http_bind_addr: self.http_addr.unwrap_or(base.http_bind_addr),
            write_timeout: self
                .write_timeout
                .map(Duration::from_secs)
                .unwrap_or(base.write_timeout),
            pong_timeout: self
                .pong_timeout
                .map(Duration::from_secs)
                .unwrap_or(base.pong_timeout),
            max_frame_bytes: self.max_frame_bytes.unwrap_or(base.max_frame_bytes),
            send_queue_capacity: base.send_queue_capacity,
            event_queue_capacity: base.event_queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(cli.into_broker_config()?);

    info!(
        "peerhub broker starting — sessions on {}, facade on {}",
        config.ws_bind_addr, config.http_bind_addr
    );

    // The in-memory adapters back local deployments; persistent identity
    // storage and real notification delivery plug in behind the same traits.
    let store: Arc<dyn IdentityStore> = Arc::new(MemoryStore::new());
    let notifier: Arc<dyn VerificationNotifier> = Arc::new(LogNotifier);
    let directory = Arc::new(Directory::new(Arc::clone(&store), Arc::clone(&notifier)));

    let (hub, hub_handle) = Hub::new(config.event_queue_capacity);
    let hub_task = tokio::spawn(hub.run());

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C: {e}"),
        }
    });

    let ws = run_ws_server(
        Arc::clone(&config),
        store,
        notifier,
        hub_handle.clone(),
        Arc::clone(&running),
    );
    let http = run_http_server(
        config.http_bind_addr,
        ApiState { directory },
        Arc::clone(&running),
    );
    tokio::try_join!(ws, http)?;

    // The accept loop has returned and its sessions have drained; dropping
    // the last producer handle lets the hub loop finish.
    drop(hub_handle);
    hub_task.await.context("hub task panicked")?;

    info!("peerhub broker stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_resolve_to_default_config() {
        let cli = Cli::parse_from(["peerhub-broker"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_cli_ws_addr_override() {
        let cli = Cli::parse_from(["peerhub-broker", "--ws-addr", "127.0.0.1:9100"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.ws_bind_addr.port(), 9100);
        // Untouched settings keep their defaults.
        assert_eq!(config.http_bind_addr.port(), 17778);
    }

    #[test]
    fn test_cli_http_addr_override() {
        let cli = Cli::parse_from(["peerhub-broker", "--http-addr", "127.0.0.1:9101"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.http_bind_addr.port(), 9101);
    }

    #[test]
    fn test_cli_timeout_overrides() {
        let cli = Cli::parse_from([
            "peerhub-broker",
            "--pong-timeout",
            "30",
            "--write-timeout",
            "5",
        ]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval(), Duration::from_secs(27));
    }

    #[test]
    fn test_cli_max_frame_bytes_override() {
        let cli = Cli::parse_from(["peerhub-broker", "--max-frame-bytes", "2048"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.max_frame_bytes, 2048);
    }

    #[test]
    fn test_cli_invalid_pong_timeout_is_rejected() {
        let cli = Cli::parse_from(["peerhub-broker", "--pong-timeout", "0"]);
        assert!(cli.into_broker_config().is_err());
    }

    #[test]
    fn test_cli_rejects_malformed_address() {
        let result = Cli::try_parse_from(["peerhub-broker", "--ws-addr", "not-an-address"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_config_file_applies_under_cli_precedence() {
        let dir = std::env::temp_dir().join(format!("peerhub_main_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broker.toml");
        std::fs::write(
            &path,
            r#"
[listen]
ws = "127.0.0.1:9200"

[session]
pong_timeout_secs = 40
"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "peerhub-broker",
            "--config",
            path.to_str().unwrap(),
            "--pong-timeout",
            "50",
        ]);
        let config = cli.into_broker_config().unwrap();

        // File applies where the CLI is silent; CLI wins where both speak.
        assert_eq!(config.ws_bind_addr.port(), 9200);
        assert_eq!(config.pong_timeout, Duration::from_secs(50));

        std::fs::remove_dir_all(&dir).ok();
    }
}
