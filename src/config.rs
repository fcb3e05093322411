//! Harvester configuration, loaded from TOML.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [index]
//! content = "dcat"
//! lineage = "harvest"
//! api = "acat"
//!
//! [enrichment]
//! lookup_concurrency = 8
//!
//! [executor]
//! max_concurrent_cycles = 4
//!
//! [validation]
//! uri_matching = "substring"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::harvest::validation::UriMatching;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarvesterConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Names of the target indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexConfig {
    /// Catalog, dataset and subject documents
    #[serde(default = "default_content_index")]
    pub content: String,
    /// Lineage documents
    #[serde(default = "default_lineage_index")]
    pub lineage: String,
    /// API specification documents
    #[serde(default = "default_api_index")]
    pub api: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            content: default_content_index(),
            lineage: default_lineage_index(),
            api: default_api_index(),
        }
    }
}

fn default_content_index() -> String {
    "dcat".to_string()
}
fn default_lineage_index() -> String {
    "harvest".to_string()
}
fn default_api_index() -> String {
    "acat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Maximum reference lookups in flight for one document
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: default_lookup_concurrency(),
        }
    }
}

fn default_lookup_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum harvest cycles running at once across sources
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cycles: default_max_concurrent_cycles(),
        }
    }
}

fn default_max_concurrent_cycles() -> usize {
    4
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub uri_matching: UriMatching,
}

impl HarvesterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: HarvesterConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.enrichment.lookup_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "enrichment.lookup_concurrency must be at least 1".to_string(),
            ));
        }
        if self.executor.max_concurrent_cycles == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_concurrent_cycles must be at least 1".to_string(),
            ));
        }
        for (key, name) in [
            ("index.content", &self.index.content),
            ("index.lineage", &self.index.lineage),
            ("index.api", &self.index.api),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}
