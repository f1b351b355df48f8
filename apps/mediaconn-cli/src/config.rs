//! CLI configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediaconn_core::ClientConfig;
use serde::Deserialize;

/// CLI configuration loaded from YAML with environment overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Core client settings (timeouts, device identity).
    #[serde(flatten)]
    pub client: ClientConfig,

    /// Directory holding the saved server list.
    /// Override: `MEDIACONN_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEDIACONN_PROBE_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.client.probe_timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("MEDIACONN_WAKE_ON_LAN") {
            if let Ok(enabled) = val.parse() {
                self.client.wake_on_lan = enabled;
            }
        }

        if let Ok(val) = std::env::var("MEDIACONN_DEVICE_NAME") {
            if !val.trim().is_empty() {
                self.client.device_name = val;
            }
        }

        // MEDIACONN_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }
}
