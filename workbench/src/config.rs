use std::path::{Path, PathBuf};

use common::log_setup::LogSettings;
use common::FileFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::jobs::DEFAULT_POLL_INTERVAL_MS;

/// Static client configuration. Missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    pub api_url: String,
    pub tile_size: u32,
    pub lower_percentile_default: f64,
    pub upper_percentile_default: f64,
    pub job_poll_interval_ms: u64,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// Photometry source marker radius in pixels.
    pub marker_radius: f64,
    pub custom_marker_radius: f64,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            api_url: "/api/v1.0".to_string(),
            tile_size: 512,
            lower_percentile_default: 10.0,
            upper_percentile_default: 99.95,
            job_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            log_level: "info".to_string(),
            log_dir: None,
            marker_radius: 15.0,
            custom_marker_radius: 10.0,
        }
    }
}

impl WorkbenchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = FileFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        common::serde::deserialize(&bytes, format).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            level: self.log_level.clone(),
            directory: self.log_dir.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: WorkbenchConfig = common::serde::deserialize(
            b"api_url: https://example.org/api/v1.0\nmarker_radius: 20\n",
            FileFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.api_url, "https://example.org/api/v1.0");
        assert_eq!(config.marker_radius, 20.0);
        assert_eq!(config.tile_size, 512);
        assert_eq!(config.upper_percentile_default, 99.95);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("workbench-config-that-does-not-exist.yaml");
        assert_eq!(WorkbenchConfig::load_or_default(&path).unwrap(), WorkbenchConfig::default());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = WorkbenchConfig::load(Path::new("workbench.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Format(_)));
    }
}
