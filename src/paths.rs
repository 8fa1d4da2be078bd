//! Application data paths

use crate::config::AppConfig;
use std::path::PathBuf;

/// Directory name under the platform data dir
const APP_DIR: &str = "camdeck-gw";

/// Per-user data directory, falling back to the working directory
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Resolved settings database path: config override, else the data dir
pub fn settings_db_path(config: &AppConfig) -> PathBuf {
    config
        .storage
        .path
        .clone()
        .unwrap_or_else(|| data_dir().join("settings.sled"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn config_override_wins() {
        let config = AppConfig {
            storage: StorageConfig {
                path: Some(PathBuf::from("/tmp/custom.sled")),
                ..StorageConfig::default()
            },
            ..AppConfig::default()
        };
        assert_eq!(settings_db_path(&config), PathBuf::from("/tmp/custom.sled"));
    }

    #[test]
    fn default_lands_in_the_app_data_dir() {
        let path = settings_db_path(&AppConfig::default());
        assert!(path.ends_with("settings.sled"));
        assert!(path.to_string_lossy().contains(APP_DIR));
    }
}
