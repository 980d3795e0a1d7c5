//! Dashboard configuration.

use std::path::Path;

use metro_core::{ClientConfig, NetworkConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Where the metro server lives.
    pub server: ServerConfig,
    /// Timeouts and reply budget.
    pub network: NetworkConfig,
    /// Telemetry listener tuning.
    pub telemetry: TelemetryConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Server address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Log file. The dashboard owns the terminal, so logs never go to stdout.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: "metro-cli.log".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load from a TOML file. A missing file gives the defaults; a file
    /// that does not parse is returned as an error for the caller to
    /// report once logging is up.
    pub fn load(path: &Path) -> Result<Self, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The engine's share of the settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            network: self.network.clone(),
            telemetry: self.telemetry.clone(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
