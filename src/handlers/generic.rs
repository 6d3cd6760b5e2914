//! Generic URL-to-file downloads declared in a JSON file
//!
//! ```json
//! {
//!   "downloads": [
//!     { "url": "http://cam.local/config.cfg", "filename": "front.cfg", "folder": "cameras" },
//!     { "url": "http://nas.local/export/system.json", "folder": "nas" }
//!   ]
//! }
//! ```
//!
//! The file is read when a backup runs, not during discovery, so edits made
//! between runs are picked up without rediscovering handlers.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::registry::{DiscoveryContext, HandlerKind};
use super::traits::{BackupHandler, HandlerError};
use super::types::{DeviceIdentity, DiscoveredEntry, DownloadItem, DownloadState};
use crate::host::HostContext;
use crate::http::HttpClient;

pub const KIND_NAME: &str = "generic_download";

/// Location of the download file below the host config directory
pub const CONFIG_RELATIVE_PATH: &str = "backup_octopus_backups/generic_downloads.json";
pub const DEFAULT_DEVICE_NAME: &str = "Generic Downloads";
pub const DEFAULT_DEVICE_ID: &str = "generic-downloads-handler";

pub const KIND: HandlerKind = HandlerKind {
    name: KIND_NAME,
    find_entries,
    create_handlers_from_entry,
};

/// Reasons the download file produced no work
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("download config not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read download config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download config {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("download config must be a JSON object")]
    NotAnObject,
    #[error("download config is missing a non-empty 'downloads' field")]
    MissingDownloads,
    #[error("download config 'downloads' must be a list")]
    DownloadsNotAList,
    #[error("download config contains no valid downloads")]
    NoValidDownloads,
}

#[derive(Debug)]
pub struct GenericDownloadHandler {
    identity: DeviceIdentity,
    http: HttpClient,
    /// `None` for handlers built with a fixed download list
    config_path: Option<PathBuf>,
    state: Mutex<DownloadState>,
}

impl GenericDownloadHandler {
    /// File-backed handler; downloads are loaded on each backup
    pub fn new(config_path: impl Into<PathBuf>, http: HttpClient) -> Self {
        Self {
            identity: DeviceIdentity::new(DEFAULT_DEVICE_NAME, DEFAULT_DEVICE_ID),
            http,
            config_path: Some(config_path.into()),
            state: Mutex::new(DownloadState::Unloaded),
        }
    }

    /// Handler with an inline download list that never touches a file
    pub fn with_downloads(downloads: Vec<DownloadItem>, http: HttpClient) -> Self {
        Self {
            identity: DeviceIdentity::new(DEFAULT_DEVICE_NAME, DEFAULT_DEVICE_ID),
            http,
            config_path: None,
            state: Mutex::new(DownloadState::Loaded(downloads)),
        }
    }

    /// Where a host keeps the download file
    pub fn config_path_for(host: &HostContext) -> PathBuf {
        host.path_override(KIND_NAME)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| host.path(CONFIG_RELATIVE_PATH))
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub async fn state(&self) -> DownloadState {
        self.state.lock().await.clone()
    }

    /// Re-read the download file into `state`; inline handlers keep their list
    async fn refresh(&self) {
        let Some(path) = &self.config_path else {
            return;
        };

        let loaded = match load_downloads(path).await {
            Ok(items) => {
                info!(path = %path.display(), count = items.len(), "Generic download config loaded");
                DownloadState::Loaded(items)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Generic download config unavailable; handler disabled for this run");
                DownloadState::Unloaded
            }
        };

        *self.state.lock().await = loaded;
    }

    /// Downloads cached for this run, or `None` when there is nothing to do
    async fn load_for_run(&self) -> Option<Vec<DownloadItem>> {
        self.refresh().await;

        match &*self.state.lock().await {
            DownloadState::Loaded(items) if !items.is_empty() => Some(items.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl BackupHandler for GenericDownloadHandler {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn fetch_backup(&self, folder: &Path) -> Result<(), HandlerError> {
        info!(device_id = self.identity.device_id(), "Generic backup started");

        let Some(downloads) = self.load_for_run().await else {
            warn!("Generic download configuration could not be loaded; skipping backup");
            return Ok(());
        };

        for item in &downloads {
            if item.url.is_empty() || item.filename.is_empty() || item.folder.is_empty() {
                return Err(HandlerError::InvalidItem(
                    "download item must include url, filename and folder".to_string(),
                ));
            }

            let data = self.http.get_bytes(&item.url).await?;

            let target_dir = folder.join(&item.folder);
            tokio::fs::create_dir_all(&target_dir)
                .await
                .map_err(|e| HandlerError::persist(&target_dir, e))?;

            let target = item.target_path(folder);
            info!(url = %item.url, path = %target.display(), "Generic download: saving");
            tokio::fs::write(&target, &data)
                .await
                .map_err(|e| HandlerError::persist(&target, e))?;
        }

        Ok(())
    }
}

/// Read and validate the download file
pub async fn load_downloads(path: &Path) -> Result<Vec<DownloadItem>, ConfigLoadError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigLoadError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let document: Value = serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_downloads(&document)
}

/// Validate a parsed download document
///
/// Items without a usable url, filename or folder are skipped; the document
/// only fails when nothing valid remains.
pub fn validate_downloads(document: &Value) -> Result<Vec<DownloadItem>, ConfigLoadError> {
    let object = document.as_object().ok_or(ConfigLoadError::NotAnObject)?;

    let downloads = match object.get("downloads") {
        None | Some(Value::Null) => return Err(ConfigLoadError::MissingDownloads),
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(ConfigLoadError::MissingDownloads);
        }
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ConfigLoadError::DownloadsNotAList),
    };

    let validated: Vec<DownloadItem> = downloads
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let parsed = validate_item(item);
            if parsed.is_none() {
                warn!(index, "Skipping invalid generic download entry without url/filename/folder");
            }
            parsed
        })
        .collect();

    if validated.is_empty() {
        return Err(ConfigLoadError::NoValidDownloads);
    }

    Ok(validated)
}

fn validate_item(item: &Value) -> Option<DownloadItem> {
    let Some(object) = item.as_object() else {
        debug!("Skipping non-object download item");
        return None;
    };

    let field = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let url = field("url")?;
    let filename = match field("filename") {
        Some(filename) => filename.to_string(),
        None => filename_from_url(url)?,
    };
    let folder = field("folder")?;

    let item = DownloadItem::new(url, filename, folder);
    if !item.has_safe_paths() {
        warn!(url, folder, "Skipping download entry whose path leaves the backup folder");
        return None;
    }

    Some(item)
}

/// Last path segment of `url`, ignoring a trailing slash; the host when the path is empty
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok();
    let path = match &parsed {
        Some(parsed) => parsed.path().to_string(),
        None => url.to_string(),
    };

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|parsed| parsed.host_str())
                .map(str::to_string)
        })
}

fn find_entries(_host: &HostContext) -> Vec<DiscoveredEntry> {
    vec![DiscoveredEntry::Placeholder]
}

fn create_handlers_from_entry(
    ctx: &DiscoveryContext<'_>,
    _entry: &DiscoveredEntry,
) -> Vec<Box<dyn BackupHandler>> {
    let path = GenericDownloadHandler::config_path_for(ctx.host);
    debug!(path = %path.display(), "Generic download handler created; config loads at backup time");

    vec![Box::new(GenericDownloadHandler::new(path, ctx.http.clone()))]
}
