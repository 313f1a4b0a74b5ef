//! Broker configuration.
//!
//! [`BrokerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from CLI arguments, optionally merged with a
//! TOML file, and then shared across the listener and session tasks.
//!
//! The timing defaults mirror the protocol's liveness contract: the write
//! deadline bounds every socket send, the pong window bounds how long a
//! session may stay silent, and the keepalive ping period is always 9/10 of
//! the pong window so a healthy client answers before its deadline expires.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A setting failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All runtime configuration for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Address the session (WebSocket) listener binds to.
    pub ws_bind_addr: SocketAddr,
    /// Address the HTTP facade listener binds to.
    pub http_bind_addr: SocketAddr,
    /// Time allowed for a single socket write (application frame, keepalive,
    /// or close).
    pub write_timeout: Duration,
    /// Time allowed between pongs before a session is considered dead.
    pub pong_timeout: Duration,
    /// Maximum size of an inbound frame in bytes; larger input terminates
    /// the connection.
    pub max_frame_bytes: usize,
    /// Capacity of each session's outbound queue.
    pub send_queue_capacity: usize,
    /// Capacity of the hub's serialized event queue.
    pub event_queue_capacity: usize,
}

impl BrokerConfig {
    /// Keepalive ping period: 9/10 of the pong window, so intermediaries
    /// never see an idle connection and the remote read deadline is refreshed
    /// in time.
    pub fn ping_interval(&self) -> Duration {
        self.pong_timeout * 9 / 10
    }

    /// Checks the settings for values the broker cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero timeouts or zero queue
    /// capacities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pong_timeout < Duration::from_secs(1) {
            return Err(ConfigError::Invalid(
                "pong timeout must be at least one second".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "write timeout must be non-zero".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max frame size must be non-zero".to_string(),
            ));
        }
        if self.send_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    /// Returns a `BrokerConfig` suitable for local development.
    ///
    /// | Field                | Default          |
    /// |----------------------|------------------|
    /// | ws_bind_addr         | `0.0.0.0:17777`  |
    /// | http_bind_addr       | `0.0.0.0:17778`  |
    /// | write_timeout        | 10 seconds       |
    /// | pong_timeout         | 60 seconds       |
    /// | max_frame_bytes      | 512              |
    /// | send_queue_capacity  | 8                |
    /// | event_queue_capacity | 16               |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            ws_bind_addr: "0.0.0.0:17777".parse().unwrap(),
            http_bind_addr: "0.0.0.0:17778".parse().unwrap(),
            write_timeout: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(60),
            max_frame_bytes: 512,
            send_queue_capacity: 8,
            event_queue_capacity: 16,
        }
    }
}

// ── Config file schema ────────────────────────────────────────────────────────

/// Optional TOML overlay for [`BrokerConfig`]. Every field is optional;
/// absent fields keep the defaults so partial files and first runs work.
///
/// ```toml
/// [listen]
/// ws = "0.0.0.0:17777"
/// http = "0.0.0.0:17778"
///
/// [session]
/// pong_timeout_secs = 60
/// write_timeout_secs = 10
/// max_frame_bytes = 512
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub listen: ListenSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub hub: HubSection,
}

/// `[listen]` section: bind addresses.
#[derive(Debug, Default, Deserialize)]
pub struct ListenSection {
    pub ws: Option<SocketAddr>,
    pub http: Option<SocketAddr>,
}

/// `[session]` section: per-connection limits and deadlines.
#[derive(Debug, Default, Deserialize)]
pub struct SessionSection {
    pub pong_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub max_frame_bytes: Option<usize>,
    pub send_queue_capacity: Option<usize>,
}

/// `[hub]` section: coordinator queue sizing.
#[derive(Debug, Default, Deserialize)]
pub struct HubSection {
    pub event_queue_capacity: Option<usize>,
}

impl ConfigFile {
    /// Loads the overlay from `path`, returning an empty overlay when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than
    /// "not found" and [`ConfigError::Parse`] for malformed TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Applies the overlay on top of `base`, returning the merged config.
    pub fn apply(self, base: BrokerConfig) -> BrokerConfig {
        BrokerConfig {
            ws_bind_addr: self.listen.ws.unwrap_or(base.ws_bind_addr),
            http_bind_addr: self.listen.http.unwrap_or(base.http_bind_addr),
            write_timeout: self
                .session
                .write_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.write_timeout),
            pong_timeout: self
                .session
                .pong_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.pong_timeout),
            max_frame_bytes: self.session.max_frame_bytes.unwrap_or(base.max_frame_bytes),
            send_queue_capacity: self
                .session
                .send_queue_capacity
                .unwrap_or(base.send_queue_capacity),
            event_queue_capacity: self
                .hub
                .event_queue_capacity
                .unwrap_or(base.event_queue_capacity),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
