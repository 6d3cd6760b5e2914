//! Host-side configuration sources read by handler discovery
//!
//! The host owns a list of integration entries (one per configured device)
//! and a device registry that links registered devices back to the entry
//! that created them. Discovery only ever reads from here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One integration entry declared by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    #[serde(default)]
    pub title: String,
    /// Integration-specific fields (host, ip_address, ...)
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ConfigEntry {
    pub fn new(
        entry_id: impl Into<String>,
        domain: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            domain: domain.into(),
            title: title.into(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Non-blank string value stored under `key`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Device registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Entry that registered this device
    pub config_entry_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Management URL advertised by the device (e.g. `http://wled-kitchen.local`)
    #[serde(default)]
    pub configuration_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        Self { devices }
    }

    pub fn devices_for_entry<'a>(
        &'a self,
        entry_id: &'a str,
    ) -> impl Iterator<Item = &'a DeviceRecord> + 'a {
        self.devices
            .iter()
            .filter(move |device| device.config_entry_id == entry_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Read-only view of the host configuration handed to discovery
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    entries: Vec<ConfigEntry>,
    devices: DeviceRegistry,
    config_dir: PathBuf,
    path_overrides: BTreeMap<String, PathBuf>,
}

impl HostContext {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_entries(mut self, entries: Vec<ConfigEntry>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_devices(mut self, devices: DeviceRegistry) -> Self {
        self.devices = devices;
        self
    }

    /// Pin the path a handler kind reads its own configuration from
    pub fn with_path_override(mut self, kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.path_overrides.insert(kind.into(), path.into());
        self
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn entries_for_domain<'a>(
        &'a self,
        domain: &'a str,
    ) -> impl Iterator<Item = &'a ConfigEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.domain == domain)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Resolve a path relative to the host configuration directory
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.config_dir.join(relative)
    }

    pub fn path_override(&self, kind: &str) -> Option<&Path> {
        self.path_overrides.get(kind).map(PathBuf::as_path)
    }
}
