use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::handlers::{BackupHandler, DeviceIdentity, HandlerError};

/// Provenance file written next to a handler's payload
pub const ENTRY_FILE: &str = "entry.json";

/// A registered handler plus the orchestration wrapped around it
pub struct BackupUnit {
    handler: Box<dyn BackupHandler>,
    backup_folder: Option<PathBuf>,
}

impl BackupUnit {
    pub fn new(handler: Box<dyn BackupHandler>) -> Self {
        Self {
            handler,
            backup_folder: None,
        }
    }

    /// Write this unit's backups to `folder` instead of the default layout
    pub fn with_backup_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.backup_folder = Some(folder.into());
        self
    }

    pub fn handler(&self) -> &dyn BackupHandler {
        self.handler.as_ref()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.handler.identity()
    }

    /// Override, or `<backups_root>/<device_name>/<device_id>`
    pub fn backup_folder(&self, backups_root: &Path) -> PathBuf {
        self.backup_folder
            .clone()
            .unwrap_or_else(|| self.identity().default_folder(backups_root))
    }

    /// Run one backup; `true` on success
    ///
    /// Every error is logged here with the device identity and never returned.
    pub async fn run_backup(&self, backups_root: &Path, fetch_timeout: Option<Duration>) -> bool {
        let identity = self.identity();
        let folder = self.backup_folder(backups_root);

        match self.try_run(&folder, fetch_timeout).await {
            Ok(()) => {
                info!(
                    device_name = identity.device_name(),
                    device_id = identity.device_id(),
                    folder = %folder.display(),
                    "Backup completed"
                );
                true
            }
            Err(err) => {
                error!(
                    device_name = identity.device_name(),
                    device_id = identity.device_id(),
                    error = %err,
                    "Backup failed"
                );
                false
            }
        }
    }

    async fn try_run(&self, folder: &Path, fetch_timeout: Option<Duration>) -> Result<(), HandlerError> {
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|e| HandlerError::persist(folder, e))?;

        self.write_provenance(folder).await;

        let fetch = self.handler.fetch_backup(folder);
        match fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| HandlerError::Timeout(limit))?,
            None => fetch.await,
        }
    }

    /// Best effort; a failed write is only logged
    async fn write_provenance(&self, folder: &Path) {
        let Some(entry) = self.handler.source_entry() else {
            return;
        };

        let path = folder.join(ENTRY_FILE);
        let result = match serde_json::to_vec_pretty(entry) {
            Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(err) = result {
            warn!(
                device_id = self.identity().device_id(),
                path = %path.display(),
                error = %err,
                "Failed to write config entry provenance"
            );
        }
    }
}

impl std::fmt::Debug for BackupUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupUnit")
            .field("identity", self.identity())
            .field("backup_folder", &self.backup_folder)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ConfigEntry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FileHandler {
        identity: DeviceIdentity,
        entry: Option<ConfigEntry>,
        calls: AtomicUsize,
    }

    impl FileHandler {
        fn new(entry: Option<ConfigEntry>) -> Self {
            Self {
                identity: DeviceIdentity::new("Porch", "10.0.0.9"),
                entry,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BackupHandler for FileHandler {
        fn identity(&self) -> &DeviceIdentity {
            &self.identity
        }

        fn source_entry(&self) -> Option<&ConfigEntry> {
            self.entry.as_ref()
        }

        async fn fetch_backup(&self, folder: &Path) -> Result<(), HandlerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let path = folder.join("cfg.json");
            tokio::fs::write(&path, format!("{{\"run\":{n}}}"))
                .await
                .map_err(|e| HandlerError::persist(&path, e))
        }
    }

    struct SlowHandler {
        identity: DeviceIdentity,
    }

    #[async_trait]
    impl BackupHandler for SlowHandler {
        fn identity(&self) -> &DeviceIdentity {
            &self.identity
        }

        async fn fetch_backup(&self, _folder: &Path) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_backup_uses_stable_default_folder() {
        let temp_dir = TempDir::new().unwrap();
        let unit = BackupUnit::new(Box::new(FileHandler::new(None)));
        let expected = temp_dir.path().join("Porch").join("10.0.0.9");

        assert!(unit.run_backup(temp_dir.path(), None).await);
        assert!(unit.run_backup(temp_dir.path(), None).await);

        assert_eq!(unit.backup_folder(temp_dir.path()), expected);
        assert_eq!(
            std::fs::read_to_string(expected.join("cfg.json")).unwrap(),
            "{\"run\":1}"
        );
        assert!(!expected.join(ENTRY_FILE).exists());
    }

    #[tokio::test]
    async fn test_run_backup_honours_folder_override() {
        let temp_dir = TempDir::new().unwrap();
        let custom = temp_dir.path().join("custom").join("nested");
        let unit = BackupUnit::new(Box::new(FileHandler::new(None))).with_backup_folder(&custom);

        assert!(unit.run_backup(temp_dir.path(), None).await);
        assert!(custom.join("cfg.json").exists());
        assert!(!temp_dir.path().join("Porch").exists());
    }

    #[tokio::test]
    async fn test_provenance_is_written_when_entry_present() {
        let temp_dir = TempDir::new().unwrap();
        let entry = ConfigEntry::new("e1", "wled", "Porch").with_data("host", "10.0.0.9");
        let unit = BackupUnit::new(Box::new(FileHandler::new(Some(entry.clone()))));

        assert!(unit.run_backup(temp_dir.path(), None).await);

        let written = std::fs::read(temp_dir.path().join("Porch/10.0.0.9").join(ENTRY_FILE)).unwrap();
        let parsed: ConfigEntry = serde_json::from_slice(&written).unwrap();
        assert_eq!(parsed, entry);
    }

    #[tokio::test]
    async fn test_provenance_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("Porch").join("10.0.0.9");
        // a directory where the provenance file should go makes the write fail
        std::fs::create_dir_all(folder.join(ENTRY_FILE)).unwrap();

        let entry = ConfigEntry::new("e1", "wled", "Porch");
        let unit = BackupUnit::new(Box::new(FileHandler::new(Some(entry))));

        assert!(unit.run_backup(temp_dir.path(), None).await);
        assert!(folder.join("cfg.json").exists());
    }

    #[tokio::test]
    async fn test_folder_creation_failure_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let unit = BackupUnit::new(Box::new(FileHandler::new(None)))
            .with_backup_folder(blocker.join("inside"));

        assert!(!unit.run_backup(temp_dir.path(), None).await);
    }

    #[tokio::test]
    async fn test_fetch_timeout_fails_backup() {
        let temp_dir = TempDir::new().unwrap();
        let unit = BackupUnit::new(Box::new(SlowHandler {
            identity: DeviceIdentity::new("Slow", "slow"),
        }));

        assert!(!unit.run_backup(temp_dir.path(), Some(Duration::from_millis(50))).await);
    }
}
