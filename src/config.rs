// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Settings for the probe binary. Every section falls back to defaults, so a
// missing or partial file is never an error.

use crate::pipeline::PipelineConstructionType;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub pipeline: PipelineConfig,
    pub debug: DebugConfig,
}

/// Device bring-up settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub app_name: String,
    pub validation_layers: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "pipeline-probe".to_string(),
            validation_layers: true,
        }
    }
}

/// Which construction strategy to exercise
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub construction_type: String,
    /// Build against the recording device instead of a GPU
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            construction_type: "monolithic".to_string(),
            dry_run: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "pipeline_probe.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the construction type, defaulting to monolithic on unknown names
    pub fn construction_type(&self) -> PipelineConstructionType {
        self.pipeline.construction_type.parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown construction type '{}', defaulting to {}",
                self.pipeline.construction_type,
                PipelineConstructionType::Monolithic
            );
            PipelineConstructionType::Monolithic
        })
    }

    /// Get log level as a `log` filter
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.device.app_name, "pipeline-probe");
        assert!(config.pipeline.dry_run);
        assert_eq!(config.construction_type(), PipelineConstructionType::Monolithic);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [device]
            validation_layers = false

            [pipeline]
            construction_type = "shader_object_linked_binary"
            dry_run = false

            [debug]
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert!(!config.device.validation_layers);
        assert_eq!(config.device.app_name, "pipeline-probe");
        assert!(!config.pipeline.dry_run);
        assert_eq!(config.construction_type(), PipelineConstructionType::ShaderObjectLinkedBinary);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn unknown_construction_type_falls_back() {
        let config = Config::parse("[pipeline]\nconstruction_type = \"raytraced\"").unwrap();
        assert_eq!(config.construction_type(), PipelineConstructionType::Monolithic);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[pipeline\ndry_run = yes").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.debug.log_file, "pipeline_probe.log");
    }
}
