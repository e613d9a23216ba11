mod file_config;

pub use file_config::{FileConfig, MaintenanceFileConfig};

use crate::maintenance::SweepSettings;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that participate in config resolution. Mirrors the fields
/// a TOML config file can override.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub sweep_interval_minutes: u64,
    pub connection_audit_interval_minutes: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3080,
            logging_level: RequestsLoggingLevel::Path,
            sweep_interval_minutes: 60,
            connection_audit_interval_minutes: 1,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub sweep_interval_minutes: u64,
    pub connection_audit_interval_minutes: u64,
    pub maintenance: SweepSettings,
}

impl AppConfig {
    /// Resolves configuration from CLI arguments and an optional TOML file.
    /// File values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in the config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let sweep_interval_minutes = file
            .sweep_interval_minutes
            .unwrap_or(cli.sweep_interval_minutes);
        let connection_audit_interval_minutes = file
            .connection_audit_interval_minutes
            .unwrap_or(cli.connection_audit_interval_minutes);

        let defaults = SweepSettings::default();
        let maintenance_file = file.maintenance.unwrap_or_default();
        let maintenance = SweepSettings {
            venue_page_size: maintenance_file
                .venue_page_size
                .unwrap_or(defaults.venue_page_size),
            cleanup_batch_size: maintenance_file
                .cleanup_batch_size
                .unwrap_or(defaults.cleanup_batch_size),
            integrity_sample_size: maintenance_file
                .integrity_sample_size
                .unwrap_or(defaults.integrity_sample_size),
            activity_retention_days: maintenance_file
                .activity_retention_days
                .unwrap_or(defaults.activity_retention_days),
            gallery_retention_days: maintenance_file
                .gallery_retention_days
                .unwrap_or(defaults.gallery_retention_days),
            instance_retention_days: maintenance_file
                .instance_retention_days
                .unwrap_or(defaults.instance_retention_days),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            sweep_interval_minutes,
            connection_audit_interval_minutes,
            maintenance,
        })
    }

    pub fn venue_db_path(&self) -> PathBuf {
        self.db_dir.join("venue.db")
    }
}

/// Parses a logging level string through clap's ValueEnum machinery.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
