//! Engine configuration: timeouts and budgets.
//!
//! Every section is `#[serde(default)]`, so a partial TOML table in a
//! front end's config file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for [`crate::MetroClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection and request/response settings.
    pub network: NetworkConfig,
    /// Telemetry listener settings.
    pub telemetry: TelemetryConfig,
}

/// Connection and request/response settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Deadline for establishing the TCP connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Deadline for each reply read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Frames read while waiting for a reply before giving up.
    pub max_attempts: usize,
}

/// Telemetry listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// How long one wait for a push may block before the
    /// cancellation signal is checked again, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long `stop` waits for the loop to exit, in milliseconds.
    pub stop_grace_ms: u64,
    /// Pushes buffered between the connection reader and the listener.
    pub buffer_size: usize,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            max_attempts: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            stop_grace_ms: 2000,
            buffer_size: 64,
        }
    }
}

// ── Durations ────────────────────────────────────────────────────

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
