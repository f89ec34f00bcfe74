//! Configuration management for the opacity detector

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file location, used when no --config flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model weights configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// COVID-ResNet weights file name
    #[serde(default = "default_resnet_file")]
    pub resnet_file: String,
    /// Archive the ResNet weights are extracted from when the file is absent
    #[serde(default = "default_resnet_archive")]
    pub resnet_archive: String,
    /// Custom model weights file name
    #[serde(default = "default_custom_file")]
    pub custom_file: String,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_resnet_file() -> String {
    "covid_resnet.onnx".to_string()
}

fn default_resnet_archive() -> String {
    "covid_resnet.zip".to_string()
}

fn default_custom_file() -> String {
    "opacity_detector.onnx".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Score threshold separating Negative from Positive (inclusive upper side)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    0.3
}

/// Saliency heatmap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapConfig {
    /// Occlusion grid resolution (cells per side)
    #[serde(default = "default_heatmap_grid")]
    pub grid: usize,
    /// Model output to read activations from; falls back to occlusion when
    /// the output does not exist on the loaded graph
    #[serde(default)]
    pub layer: Option<String>,
}

fn default_heatmap_grid() -> usize {
    8
}

/// Overlay rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Heatmap blend weight in [0, 1]
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Height in pixels of the saved composite image
    #[serde(default = "default_display_height")]
    pub display_height: u32,
    /// Directory the composites are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_alpha() -> f32 {
    0.5
}

fn default_display_height() -> u32 {
    700
}

fn default_output_dir() -> String {
    "heatmaps".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration. An explicit path must exist; without one the
    /// default location is used when present, built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_path(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Resolved models directory
    pub fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.models.models_dir)
    }

    /// Resolved path of the COVID-ResNet weights
    pub fn resnet_path(&self) -> PathBuf {
        self.models_dir().join(&self.models.resnet_file)
    }

    /// Resolved path of the ResNet weights archive
    pub fn resnet_archive_path(&self) -> PathBuf {
        self.models_dir().join(&self.models.resnet_archive)
    }

    /// Resolved path of the custom model weights
    pub fn custom_path(&self) -> PathBuf {
        self.models_dir().join(&self.models.custom_file)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            resnet_file: default_resnet_file(),
            resnet_archive: default_resnet_archive(),
            custom_file: default_custom_file(),
            onnx_threads: default_onnx_threads(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            grid: default_heatmap_grid(),
            layer: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            display_height: default_display_height(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.detection.threshold, 0.3);
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.heatmap.grid, 8);
        assert_eq!(config.display.display_height, 700);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_model_paths() {
        let config = AppConfig::default();
        assert_eq!(config.resnet_path(), PathBuf::from("models/covid_resnet.onnx"));
        assert_eq!(
            config.resnet_archive_path(),
            PathBuf::from("models/covid_resnet.zip")
        );
        assert_eq!(config.custom_path(), PathBuf::from("models/opacity_detector.onnx"));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let missing = Path::new("/nonexistent/opacity-detector.toml");
        assert!(AppConfig::load(Some(missing)).is_err());
    }
}
