use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::host::{ConfigEntry, DeviceRecord};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generic: GenericConfig,
    /// Host integration entries handed to discovery
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
    /// Device registry records linked to `entries`
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

/// Backup sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    /// Host configuration directory; relative handler paths resolve against it
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Defaults to `<config_dir>/backup_octopus_backups`
    pub backups_root: Option<PathBuf>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            backups_root: None,
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_max_concurrency() -> usize {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    "backup-octopus/0.1.0".to_string()
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Generic download kind
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenericConfig {
    #[serde(default = "default_generic_enabled")]
    pub enabled: bool,
    /// Overrides `<config_dir>/backup_octopus_backups/generic_downloads.json`
    pub config_path: Option<PathBuf>,
}

impl Default for GenericConfig {
    fn default() -> Self {
        Self {
            enabled: default_generic_enabled(),
            config_path: None,
        }
    }
}

fn default_generic_enabled() -> bool {
    true
}
