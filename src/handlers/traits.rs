use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::types::DeviceIdentity;
use crate::host::ConfigEntry;
use crate::http::FetchError;

/// Handler errors
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid download item: {0}")]
    InvalidItem(String),
    #[error("backup did not finish within {0:?}")]
    Timeout(Duration),
    #[error("shutdown failed: {0}")]
    Shutdown(String),
}

impl HandlerError {
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HandlerError::Persist {
            path: path.into(),
            source,
        }
    }
}

/// A backup-capable unit for one device or source
///
/// Kinds only decide which bytes to fetch. Folder resolution, provenance and
/// the pass/fail decision live in [`crate::manager::BackupUnit::run_backup`].
#[async_trait]
pub trait BackupHandler: Send + Sync {
    fn identity(&self) -> &DeviceIdentity;

    /// Config entry this handler was discovered from, if any
    fn source_entry(&self) -> Option<&ConfigEntry> {
        None
    }

    /// Fetch the payload into `folder`, which already exists
    async fn fetch_backup(&self, folder: &Path) -> Result<(), HandlerError>;

    /// Optional resource-release capability
    fn as_shutdown(&self) -> Option<&dyn Shutdown> {
        None
    }
}

/// Implemented by handlers that hold resources needing release
#[async_trait]
pub trait Shutdown: Send + Sync {
    async fn shutdown(&self) -> Result<(), HandlerError>;
}
