use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::host::ConfigEntry;

/// Name and stable id of the device a handler backs up
///
/// `device_id` is sanitized once at construction and never changes; together
/// with `device_name` it decides the default backup folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentity {
    device_name: String,
    device_id: String,
}

impl DeviceIdentity {
    pub fn new(device_name: impl Into<String>, device_id: impl AsRef<str>) -> Self {
        Self {
            device_name: device_name.into(),
            device_id: sanitize_component(device_id.as_ref()),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// `<backups_root>/<device_name>/<device_id>`
    pub fn default_folder(&self, backups_root: &Path) -> PathBuf {
        backups_root
            .join(sanitize_component(&self.device_name))
            .join(&self.device_id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_name, self.device_id)
    }
}

/// Make a string usable as a single path component
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Entry returned by a kind's `find_entries`
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveredEntry {
    /// Sentinel for kinds that resolve their configuration at backup time
    Placeholder,
    Config(ConfigEntry),
}

impl DiscoveredEntry {
    /// Short label used in logs
    pub fn label(&self) -> &str {
        match self {
            DiscoveredEntry::Placeholder => "<placeholder>",
            DiscoveredEntry::Config(entry) => &entry.entry_id,
        }
    }
}

/// Network address of a device, extracted from its config entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: Option<u16>,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }

    /// Parse either a bare host (`10.0.0.5`, `wled.local:8080`) or a URL
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let url = if raw.contains("://") {
            reqwest::Url::parse(raw).ok()?
        } else {
            reqwest::Url::parse(&format!("http://{raw}")).ok()?
        };

        let host = url.host_str()?.trim_matches(|c| c == '[' || c == ']');
        if host.is_empty() {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            port: url.port(),
        })
    }

    /// `host` or `host:port`
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

/// One URL-to-file mapping of the generic download kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub url: String,
    pub filename: String,
    /// Subfolder below the handler's backup folder
    pub folder: String,
}

impl DownloadItem {
    pub fn new(
        url: impl Into<String>,
        filename: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            folder: folder.into(),
        }
    }

    pub fn target_path(&self, backup_folder: &Path) -> PathBuf {
        backup_folder.join(&self.folder).join(&self.filename)
    }

    /// `folder` must stay below the backup folder and `filename` must be a
    /// single component.
    pub fn has_safe_paths(&self) -> bool {
        let folder_ok = !self.folder.trim().is_empty()
            && Path::new(&self.folder)
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        let filename_ok = !self.filename.trim().is_empty()
            && !self.filename.contains(['/', '\\'])
            && self.filename != "."
            && self.filename != "..";

        folder_ok && filename_ok
    }
}

/// Download list of the generic kind, loaded lazily at backup time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    Unloaded,
    Loaded(Vec<DownloadItem>),
}

impl DownloadState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, DownloadState::Loaded(_))
    }

    pub fn items(&self) -> &[DownloadItem] {
        match self {
            DownloadState::Unloaded => &[],
            DownloadState::Loaded(items) => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_identity_folder_is_stable() {
        let identity = DeviceIdentity::new("WLED Living Room", "192.168.173.133");
        let root = Path::new("/backups");

        let first = identity.default_folder(root);
        let second = identity.default_folder(root);

        assert_eq!(first, PathBuf::from("/backups/WLED Living Room/192.168.173.133"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_id_is_sanitized() {
        let identity = DeviceIdentity::new("Desk/Lamp", "wled.local:8080");
        assert_eq!(identity.device_id(), "wled.local_8080");
        assert_eq!(
            identity.default_folder(Path::new("/b")),
            PathBuf::from("/b/Desk_Lamp/wled.local_8080")
        );

        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("  "), "_");
    }

    #[test]
    fn test_connection_info_parse() {
        assert_eq!(
            ConnectionInfo::parse("192.168.1.20"),
            Some(ConnectionInfo::new("192.168.1.20"))
        );

        let with_port = ConnectionInfo::parse("wled.local:8080").unwrap();
        assert_eq!(with_port.host, "wled.local");
        assert_eq!(with_port.port, Some(8080));
        assert_eq!(with_port.base_url(), "http://wled.local:8080");

        let from_url = ConnectionInfo::parse("http://kitchen.local/settings").unwrap();
        assert_eq!(from_url.host, "kitchen.local");
        assert_eq!(from_url.port, None);

        assert_eq!(ConnectionInfo::parse(""), None);
        assert_eq!(ConnectionInfo::parse("http://"), None);
    }

    #[test]
    fn test_download_item_path_safety() {
        assert!(DownloadItem::new("http://x/a", "a.cfg", "cams/front").has_safe_paths());
        assert!(!DownloadItem::new("http://x/a", "a.cfg", "../escape").has_safe_paths());
        assert!(!DownloadItem::new("http://x/a", "a.cfg", "/etc").has_safe_paths());
        assert!(!DownloadItem::new("http://x/a", "sub/a.cfg", "cams").has_safe_paths());
        assert!(!DownloadItem::new("http://x/a", "..", "cams").has_safe_paths());
    }

    #[test]
    fn test_download_state_default_is_unloaded() {
        let state = DownloadState::default();
        assert!(!state.is_loaded());
        assert!(state.items().is_empty());

        let loaded = DownloadState::Loaded(vec![DownloadItem::new("http://x/a", "a", "f")]);
        assert!(loaded.is_loaded());
        assert_eq!(loaded.items().len(), 1);
    }
}
