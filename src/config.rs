//! Engine configuration loading.

use crate::media::MediaType;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Whether the recovery guard wraps chain execution. When off, handler
    /// failures surface to the transport caller instead of being normalized.
    #[serde(default = "defaults::recovery")]
    pub recovery: bool,

    /// Content type applied to responses before any handler runs.
    #[serde(default)]
    pub default_media_type: MediaType,

    /// Initial capacity for each context's attribute map.
    #[serde(default = "defaults::attribute_capacity")]
    pub attribute_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recovery: defaults::recovery(),
            default_media_type: MediaType::default(),
            attribute_capacity: defaults::attribute_capacity(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

mod defaults {
    pub fn recovery() -> bool {
        true
    }

    pub fn attribute_capacity() -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.recovery);
        assert_eq!(config.default_media_type, MediaType::Json);
        assert_eq!(config.attribute_capacity, 8);
    }

    #[test]
    fn test_parse_overrides() {
        let config: EngineConfig = toml::from_str(
            r#"
            recovery = false
            default_media_type = "xml"
            attribute_capacity = 16
            "#,
        )
        .unwrap();
        assert!(!config.recovery);
        assert_eq!(config.default_media_type, MediaType::Xml);
        assert_eq!(config.attribute_capacity, 16);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert!(config.recovery);
    }
}
