//! Configuration management
//!
//! YAML application config: an optional default device address seeded into
//! fresh placements, poll cadence and settings-store tuning. Every field
//! has a default so the gateway runs with no config file at all.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Default device address for newly placed controls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_device_port")]
    pub port: u16,
}

/// Shared poll cadence for the synchronized quantities
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_quantity_interval")]
    pub quantity_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            quantity_interval_secs: default_quantity_interval(),
        }
    }
}

/// Settings database location and write debounce
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_device_port() -> u16 {
    crate::device::DEFAULT_PORT
}

fn default_quantity_interval() -> u64 {
    5
}

fn default_debounce_ms() -> u64 {
    crate::settings::DEFAULT_DEBOUNCE_MS
}

impl AppConfig {
    /// Load and parse a YAML config file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub async fn load_or_default(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if path.exists() {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.device.is_none());
        assert_eq!(config.polling.quantity_interval_secs, 5);
        assert_eq!(config.storage.debounce_ms, 500);
    }

    #[test]
    fn device_port_defaults_when_omitted() {
        let yaml = r#"
device:
  host: 10.0.0.12
polling:
  quantity_interval_secs: 2
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let device = config.device.unwrap();
        assert_eq!(device.host, "10.0.0.12");
        assert_eq!(device.port, 4747);
        assert_eq!(config.polling.quantity_interval_secs, 2);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let config = AppConfig::load_or_default("/definitely/not/here.yaml")
            .await
            .unwrap();
        assert!(config.device.is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        tokio::fs::write(&path, "device: [not a mapping").await.unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }
}
