use crate::domain::Region;
use crate::error::{IntegrationError, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// One registry file per region.
#[derive(Debug, Deserialize)]
pub struct SourcesConfig {
    pub galicia: String,
    pub catalonia: String,
    pub valencia: String,
}

#[derive(Debug, Deserialize)]
pub struct GeocodingConfig {
    /// Provider backend: "nominatim" (no key) or "opencage" (key required).
    pub provider: String,
    pub api_key: Option<String>,
    /// Minimum spacing between successive lookups, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct ValidationConfig {
    /// When set, out-of-range coordinates are nulled before validation
    /// instead of rejecting the station outright.
    pub autocorrect_out_of_range: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            autocorrect_out_of_range: true,
        }
    }
}

fn default_delay_ms() -> u64 {
    // OpenCage and Nominatim both cap at 1 req/sec; leave headroom.
    1100
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            IntegrationError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Configured file path for a region's registry.
    pub fn source_path(&self, region: Region) -> &str {
        match region {
            Region::Galicia => &self.sources.galicia,
            Region::Catalonia => &self.sources.catalonia,
            Region::Valencia => &self.sources.valencia,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml_str = r#"
            [sources]
            galicia = "data/gal.csv"
            catalonia = "data/cat.xml"
            valencia = "data/cv.json"

            [geocoding]
            provider = "nominatim"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.source_path(Region::Galicia), "data/gal.csv");
        assert_eq!(config.geocoding.delay_ms, 1100);
        assert!(config.validation.autocorrect_out_of_range);
    }
}
