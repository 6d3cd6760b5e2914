//! Configuration management for backup-octopus
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use backup_octopus::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Backups go to: {}", config.backups_root().display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BACKUP_OCTOPUS__<section>__<key>`
//!
//! Examples:
//! - `BACKUP_OCTOPUS__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `BACKUP_OCTOPUS__BACKUP__MAX_CONCURRENCY=4`
//! - `BACKUP_OCTOPUS__GENERIC__ENABLED=false`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/backup-octopus.toml`.
//! This can be overridden using the `BACKUP_OCTOPUS_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{BackupConfig, Config, GenericConfig, HttpSettings, ServerConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::handlers::generic;
use crate::host::{DeviceRegistry, HostContext};
use crate::http::HttpConfig;
use crate::manager::ManagerSettings;

/// Folder under the config directory that holds backups by default
pub const BACKUPS_DIR_NAME: &str = "backup_octopus_backups";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BACKUP_OCTOPUS__*`)
    /// 2. TOML file (default: `config/backup-octopus.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (duplicate entries, dangling device records, zero timeouts)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn backups_root(&self) -> PathBuf {
        self.backup
            .backups_root
            .clone()
            .unwrap_or_else(|| self.backup.config_dir.join(BACKUPS_DIR_NAME))
    }

    /// Host view handed to discovery
    pub fn host_context(&self) -> HostContext {
        let mut host = HostContext::new(&self.backup.config_dir)
            .with_entries(self.entries.clone())
            .with_devices(DeviceRegistry::new(self.devices.clone()));

        if let Some(path) = &self.generic.config_path {
            host = host.with_path_override(generic::KIND_NAME, path);
        }

        host
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings::new(self.backups_root())
            .with_fetch_timeout(Duration::from_secs(self.backup.fetch_timeout_secs))
            .with_max_concurrency(self.backup.max_concurrency)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http.request_timeout_secs),
            user_agent: self.http.user_agent.clone(),
        }
    }
}
