//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields keep their compiled default.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "addr": "0.0.0.0:8080", "mode": "prod" },
///   "hub": { "mailboxCapacity": 512 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubbubSettings {
    /// Listener and process settings.
    pub server: ServerSettings,
    /// Hub and per-session tunables.
    pub hub: HubSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl HubbubSettings {
    /// Reject combinations the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        let hub = &self.hub;
        if hub.mailbox_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "mailboxCapacity must be at least 1".into(),
            ));
        }
        if hub.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be at least 1".into(),
            ));
        }
        if hub.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "writeWaitMs must be at least 1".into(),
            ));
        }
        if hub.ping_period_ms == 0 || hub.ping_period_ms >= hub.pong_wait_ms {
            return Err(SettingsError::InvalidValue(format!(
                "pingPeriodMs ({}) must be non-zero and below pongWaitMs ({})",
                hub.ping_period_ms, hub.pong_wait_ms
            )));
        }
        if self.server.addr.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.addr is empty".into()));
        }
        Ok(())
    }
}

/// Deployment mode. Selects the log format and default verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Local development: human-readable logs.
    #[default]
    Dev,
    /// Production: JSON logs.
    Prod,
}

impl Mode {
    /// Lowercase name used in config files, env vars and `/health`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(SettingsError::InvalidValue(format!("unknown mode: {other}"))),
        }
    }
}

/// How queued mailbox messages are written when several are ready at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Join queued messages with `\n` into a single frame.
    ///
    /// Lossy for binary payloads that contain newlines.
    #[default]
    Newline,
    /// Write each queued message as its own frame and flush once.
    Frame,
}

impl FromStr for Framing {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "newline" => Ok(Self::Newline),
            "frame" => Ok(Self::Frame),
            other => Err(SettingsError::InvalidValue(format!("unknown framing: {other}"))),
        }
    }
}

/// Listener and process settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Socket address to bind, `host:port`.
    pub addr: String,
    /// Deployment mode.
    pub mode: Mode,
    /// How long shutdown waits for sessions to drain, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            mode: Mode::Dev,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Hub and per-session tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of each session's outbound mailbox.
    pub mailbox_capacity: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Read deadline, refreshed by every pong.
    pub pong_wait_ms: u64,
    /// Interval between pings. Must be below `pong_wait_ms`.
    pub ping_period_ms: u64,
    /// Deadline for a single outbound write.
    pub write_wait_ms: u64,
    /// Coalescing mode for queued messages.
    pub framing: Framing,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            max_message_size: 100,
            pong_wait_ms: 10_000,
            ping_period_ms: 9_000,
            write_wait_ms: 5_000,
            framing: Framing::Newline,
        }
    }
}

impl HubSettings {
    /// Read deadline.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Heartbeat period.
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    /// Write deadline.
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(SettingsError::InvalidValue(format!("unknown log level: {other}"))),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Fallback level when `RUST_LOG` is unset.
    pub level: LogLevel,
}
