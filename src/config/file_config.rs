//! Optional TOML file configuration.
//!
//! Everything here is optional; values present in the file override the
//! corresponding CLI arguments during resolution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub sweep_interval_minutes: Option<u64>,
    pub connection_audit_interval_minutes: Option<u64>,
    pub maintenance: Option<MaintenanceFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceFileConfig {
    pub venue_page_size: Option<usize>,
    pub cleanup_batch_size: Option<usize>,
    pub integrity_sample_size: Option<usize>,
    pub activity_retention_days: Option<u64>,
    pub gallery_retention_days: Option<u64>,
    pub instance_retention_days: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}
