//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Defaults follow the defensive profile: long timeouts, several retries,
//! mirror-aware candidate lists.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Page origin, e.g. `https://app.example`.
    pub origin: String,

    /// Document base URL. Falls back to `origin` when absent.
    pub base_url: Option<String>,

    /// Turns `(name, variant)` into a raw reference.
    /// `{name}` and `{variant}` are substituted.
    pub asset_template: String,

    /// Emit rasterized variants instead of vector URLs.
    pub raster: bool,

    /// Device pixel ratios for multi-resolution hints (rasters only).
    pub device_scales: Vec<f32>,

    pub retry: RetryConfig,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub registry: RegistryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            base_url: None,
            asset_template: "/icons/{variant}/{name}.svg".to_string(),
            raster: false,
            device_scales: vec![1.0],
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.origin).is_err() {
            return Err(ConfigError::Invalid {
                field: "origin",
                reason: format!("not an absolute URL: {}", self.origin),
            });
        }
        if !self.asset_template.contains("{name}") {
            return Err(ConfigError::Invalid {
                field: "asset_template",
                reason: "must contain {name}".to_string(),
            });
        }
        if self.retry.growth_factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "retry.growth_factor",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.retry.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.batch_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.device_scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConfigError::Invalid {
                field: "device_scales",
                reason: "scales must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Fill the template for one asset.
    pub fn asset_reference(&self, name: &str, variant: &str) -> String {
        self.asset_template
            .replace("{name}", name)
            .replace("{variant}", variant)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_retries: u32,
    /// Items attempted per scheduler tick.
    pub batch_size: usize,
    /// Delay multiplier on a 2g link (others are derived from it).
    pub quality_slowdown: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            growth_factor: 2.0,
            max_retries: 3,
            batch_size: 3,
            quality_slowdown: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-candidate network timeout.
    pub timeout_ms: u64,
    /// Timeout for the first resolution of inline / producer references.
    pub first_attempt_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            first_attempt_timeout_ms: 10_000,
            max_payload_bytes: 512 * 1024,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn first_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.first_attempt_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Schema version; a mismatch wipes the store.
    pub version: u32,
    pub max_age_secs: u64,
    pub max_size_bytes: u64,
    pub max_filename_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: 2,
            max_age_secs: 7 * 24 * 60 * 60,
            max_size_bytes: 50 * 1024 * 1024,
            max_filename_len: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub storage_key: String,
    /// Superseded keys purged on load.
    pub legacy_keys: Vec<String>,
    pub ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_key: "iconweave.rules.v2".to_string(),
            legacy_keys: vec![
                "iconweave.rules".to_string(),
                "iconweave.rules.v1".to_string(),
            ],
            ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}
