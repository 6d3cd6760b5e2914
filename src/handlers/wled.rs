//! WLED device-state backups
//!
//! WLED controllers expose their configuration and presets as plain JSON
//! documents. Both are stored byte-for-byte without parsing.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

use super::registry::{DiscoveryContext, HandlerKind};
use super::traits::{BackupHandler, HandlerError};
use super::types::{ConnectionInfo, DeviceIdentity, DiscoveredEntry};
use crate::host::{ConfigEntry, HostContext};
use crate::http::HttpClient;

/// Config entry domain owned by this kind
pub const DOMAIN: &str = "wled";

/// Files fetched from every device, relative to its base URL
pub const BACKUP_FILES: [&str; 2] = ["cfg.json", "presets.json"];

pub const KIND: HandlerKind = HandlerKind {
    name: "wled",
    find_entries,
    create_handlers_from_entry,
};

const ALTERNATE_HOST_KEYS: [&str; 2] = ["ip_address", "ip"];

type ExtractStrategy = fn(&HostContext, &ConfigEntry) -> Option<ConnectionInfo>;

/// Tried in order until one yields a host
const EXTRACT_STRATEGIES: [(&str, ExtractStrategy); 4] = [
    ("host field", from_host_field),
    ("alternate fields", from_alternate_fields),
    ("device registry", from_device_registry),
    ("configuration url", from_configuration_url),
];

#[derive(Debug, Clone)]
pub struct WledBackupHandler {
    identity: DeviceIdentity,
    connection: ConnectionInfo,
    http: HttpClient,
    entry: Option<ConfigEntry>,
}

impl WledBackupHandler {
    /// The device id is the device's network authority
    pub fn new(device_name: impl Into<String>, connection: ConnectionInfo, http: HttpClient) -> Self {
        Self {
            identity: DeviceIdentity::new(device_name, connection.authority()),
            connection,
            http,
            entry: None,
        }
    }

    pub fn with_source_entry(mut self, entry: ConfigEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }
}

#[async_trait]
impl BackupHandler for WledBackupHandler {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn source_entry(&self) -> Option<&ConfigEntry> {
        self.entry.as_ref()
    }

    async fn fetch_backup(&self, folder: &Path) -> Result<(), HandlerError> {
        let base_url = self.connection.base_url();

        for file in BACKUP_FILES {
            let url = format!("{base_url}/{file}");
            let data = self.http.get_bytes(&url).await?;

            let target = folder.join(file);
            tokio::fs::write(&target, &data)
                .await
                .map_err(|e| HandlerError::persist(&target, e))?;

            info!(
                device_id = self.identity.device_id(),
                url,
                size = data.len(),
                "WLED file saved"
            );
        }

        Ok(())
    }
}

fn find_entries(host: &HostContext) -> Vec<DiscoveredEntry> {
    host.entries_for_domain(DOMAIN)
        .cloned()
        .map(DiscoveredEntry::Config)
        .collect()
}

fn create_handlers_from_entry(
    ctx: &DiscoveryContext<'_>,
    entry: &DiscoveredEntry,
) -> Vec<Box<dyn BackupHandler>> {
    let DiscoveredEntry::Config(entry) = entry else {
        warn!(entry_id = entry.label(), "WLED discovery received a non-config entry");
        return Vec::new();
    };

    let Some(connection) = extract_connection_info(ctx.host, entry) else {
        warn!(
            entry_id = %entry.entry_id,
            title = %entry.title,
            "WLED entry has no usable host; skipping"
        );
        return Vec::new();
    };

    let device_name = device_name(ctx.host, entry, &connection);
    let handler = WledBackupHandler::new(device_name, connection, ctx.http.clone())
        .with_source_entry(entry.clone());

    vec![Box::new(handler)]
}

/// Find the device address for `entry`, trying each strategy in order
pub fn extract_connection_info(host: &HostContext, entry: &ConfigEntry) -> Option<ConnectionInfo> {
    EXTRACT_STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(host, entry);
        if let Some(info) = &found {
            debug!(entry_id = %entry.entry_id, strategy = name, host = %info.host, "Resolved WLED host");
        }
        found
    })
}

fn from_host_field(_host: &HostContext, entry: &ConfigEntry) -> Option<ConnectionInfo> {
    entry.data_str("host").and_then(ConnectionInfo::parse)
}

fn from_alternate_fields(_host: &HostContext, entry: &ConfigEntry) -> Option<ConnectionInfo> {
    ALTERNATE_HOST_KEYS
        .iter()
        .find_map(|key| entry.data_str(key).and_then(ConnectionInfo::parse))
}

fn from_device_registry(host: &HostContext, entry: &ConfigEntry) -> Option<ConnectionInfo> {
    host.devices()
        .devices_for_entry(&entry.entry_id)
        .filter_map(|device| device.configuration_url.as_deref())
        .find_map(ConnectionInfo::parse)
}

fn from_configuration_url(_host: &HostContext, entry: &ConfigEntry) -> Option<ConnectionInfo> {
    entry
        .data_str("configuration_url")
        .and_then(ConnectionInfo::parse)
}

/// Entry title, then registry name, then the host itself
fn device_name(host: &HostContext, entry: &ConfigEntry, connection: &ConnectionInfo) -> String {
    if !entry.title.trim().is_empty() {
        return entry.title.trim().to_string();
    }

    host.devices()
        .devices_for_entry(&entry.entry_id)
        .find_map(|device| device.name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| connection.host.clone())
}
