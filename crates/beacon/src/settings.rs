//! Service configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::hub::HubOptions;

/// Process-wide settings. Defaults apply field by field, so a config file
/// only needs the keys it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Pause between keep-alive events on each stream, in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Streams with no traffic for this long are ended, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Per-connection event buffer size.
    pub channel_capacity: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            keep_alive_interval_ms: 15_000,
            idle_timeout_ms: 3_600_000,
            channel_capacity: 64,
            cors_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file with `BEACON_*` environment
    /// overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix("BEACON").try_parsing(true))
            .build()
            .context("loading configuration")?;
        config.try_deserialize().context("parsing configuration")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            keep_alive_interval: Duration::from_millis(self.keep_alive_interval_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_broker_constants() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.keep_alive_interval_ms, 15_000);
        assert_eq!(settings.idle_timeout_ms, 3_600_000);
        assert!(settings.cors_origins.is_empty());
    }

    #[test]
    fn test_hub_options_conversion() {
        let settings = Settings {
            keep_alive_interval_ms: 500,
            idle_timeout_ms: 2_000,
            channel_capacity: 8,
            ..Settings::default()
        };
        let options = settings.hub_options();
        assert_eq!(options.keep_alive_interval, Duration::from_millis(500));
        assert_eq!(options.idle_timeout, Duration::from_secs(2));
        assert_eq!(options.channel_capacity, 8);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.channel_capacity, 64);
    }

    #[test]
    fn test_bind_addr_formats_host_and_port() {
        let settings = Settings {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Settings::default()
        };
        assert_eq!(settings.bind_addr(), "0.0.0.0:9090");
    }
}
