//! Feature store configuration.
//!
//! ```toml
//! default = "array"
//! single_flight = false
//!
//! [drivers.array]
//! driver = "array"
//!
//! [drivers.primary]
//! driver = "postgres"
//! url = "postgres://localhost/app"
//! ```

use crate::array::ARRAY_DRIVER;
use crate::error::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable overriding the default driver name.
pub const STORE_ENV_VAR: &str = "FLAGSTAFF_STORE";

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Configuration of one named driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Driver kind, e.g. `array`
    pub driver: String,

    /// Driver-specific options
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl DriverConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            options: Map::new(),
        }
    }

    /// Set a driver-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// String option, if present and a string.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }
}

/// Feature manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Name of the driver used when none is requested
    pub default: String,

    /// Named driver configurations
    #[serde(default)]
    pub drivers: HashMap<String, DriverConfig>,

    /// Let concurrent callers share one in-flight resolution per key
    #[serde(default)]
    pub single_flight: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self::new(ARRAY_DRIVER).with_driver(ARRAY_DRIVER, DriverConfig::new(ARRAY_DRIVER))
    }
}

impl FeaturesConfig {
    /// Create a configuration with no drivers and `default` as default name.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            drivers: HashMap::new(),
            single_flight: false,
        }
    }

    /// Add or replace a named driver.
    pub fn with_driver(mut self, name: impl Into<String>, driver: DriverConfig) -> Self {
        self.drivers.insert(name.into(), driver);
        self
    }

    /// Set the default driver name.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = name.into();
        self
    }

    /// Enable or disable single-flight resolution.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Look up a named driver.
    pub fn driver(&self, name: &str) -> FeatureResult<&DriverConfig> {
        self.drivers
            .get(name)
            .ok_or_else(|| FeatureError::UnknownDriver(name.to_string()))
    }

    /// Parse JSON configuration.
    pub fn from_json_str(content: &str) -> FeatureResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| FeatureError::Config(format!("JSON parse error: {}", e)))
    }

    /// Parse TOML configuration.
    pub fn from_toml_str(content: &str) -> FeatureResult<Self> {
        toml::from_str(content).map_err(|e| FeatureError::Config(format!("TOML parse error: {}", e)))
    }

    /// Parse configuration in the given format.
    pub fn parse(content: &str, format: FileFormat) -> FeatureResult<Self> {
        match format {
            FileFormat::Json => Self::from_json_str(content),
            FileFormat::Toml => Self::from_toml_str(content),
        }
    }

    /// Load configuration from a file, detecting the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> FeatureResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FeatureError::Config("No file extension found".to_string()))?;
        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| FeatureError::Config(format!("Unsupported format: {}", ext)))?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| FeatureError::Config(format!("Failed to read file: {}", e)))?;

        Self::parse(&content, format)
    }

    /// Apply `FLAGSTAFF_STORE` as the default driver name, if set.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(STORE_ENV_VAR) {
            Ok(name) => self.apply_store_override(Some(name)),
            Err(_) => self,
        }
    }

    fn apply_store_override(mut self, name: Option<String>) -> Self {
        if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
            self.default = name.trim().to_string();
        }
        self
    }
}
