#![deny(unsafe_code)]

//! Configuration loading and validation for the OpenFDD control client.
//!
//! Loads TOML configuration files and validates them. Provides the
//! [`ClientConfig`] type as the central configuration structure shared by
//! the core session layer and the CLI.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Socket path the OpenFDD daemon listens on unless configured otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/openfdd.socket";

/// Prefix the daemon's greeting line must start with.
pub const DEFAULT_HEADER_PREFIX: &str = "openfdd";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level client configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daemon socket and I/O deadlines.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Wire protocol knobs.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach the daemon.
///
/// Timeouts are in milliseconds; `0` disables the corresponding deadline
/// and lets the call wait for as long as the daemon takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Filesystem path of the daemon's Unix domain socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_io_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_io_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_io_timeout_ms(),
            write_timeout_ms: default_io_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Connect deadline, or `None` when disabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    /// Per-frame read deadline, or `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    /// Per-command write deadline, or `None` when disabled.
    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

/// Wire protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Literal prefix the daemon's header line must start with.
    #[serde(default = "default_header_prefix")]
    pub header_prefix: String,

    /// Backslash-escape `\`, `,` and newlines inside outgoing fields.
    ///
    /// When `false`, fields are joined verbatim for daemons that do not
    /// unescape input; values containing those bytes are then split.
    #[serde(default = "default_escape_outgoing")]
    pub escape_outgoing: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            header_prefix: default_header_prefix(),
            escape_outgoing: default_escape_outgoing(),
        }
    }
}

fn default_header_prefix() -> String {
    DEFAULT_HEADER_PREFIX.to_string()
}

fn default_escape_outgoing() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.socket_path.is_empty() {
            return Err(ConfigError::Validation(
                "connection.socket_path must not be empty".to_string(),
            ));
        }
        if self.protocol.header_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "protocol.header_prefix must not be empty".to_string(),
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }
        Ok(())
    }
}
