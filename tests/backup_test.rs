mod common;

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use backup_octopus::app::build_manager;
use backup_octopus::config::Config;
use backup_octopus::handlers::generic::{self, CONFIG_RELATIVE_PATH, DEFAULT_DEVICE_ID, DEFAULT_DEVICE_NAME};
use backup_octopus::handlers::{DownloadItem, GenericDownloadHandler};
use backup_octopus::manager::{BackupManager, BackupUnit, ENTRY_FILE, ManagerSettings};
use backup_octopus::observability::Metrics;

use common::{CFG_JSON, FIRMWARE_BIN, NOTES_TXT, PRESETS_JSON, http_client, start_mock_server, write_downloads};

#[tokio::test]
async fn test_generic_downloads_land_in_configured_folders() {
    let base_url = start_mock_server().await.unwrap();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config").join(CONFIG_RELATIVE_PATH);
    let backups_root = temp_dir.path().join("backups");

    write_downloads(
        &config_path,
        &json!({
            "downloads": [
                { "url": format!("{base_url}/files/firmware.bin"), "filename": "fw.bin", "folder": "router" },
                // filename derived from the url
                { "url": format!("{base_url}/files/notes.txt"), "folder": "docs/2026" },
                { "url": format!("{base_url}/files/notes.txt"), "folder": "../escape" },
            ]
        }),
    );

    let mut manager = BackupManager::new(ManagerSettings::new(&backups_root));
    manager
        .register_handler(Box::new(GenericDownloadHandler::new(&config_path, http_client())))
        .unwrap();

    let report = manager.run_backups().await;
    assert!(report.all_succeeded());

    let folder = backups_root.join(DEFAULT_DEVICE_NAME).join(DEFAULT_DEVICE_ID);
    assert_eq!(fs::read(folder.join("router/fw.bin")).unwrap(), FIRMWARE_BIN);
    assert_eq!(fs::read_to_string(folder.join("docs/2026/notes.txt")).unwrap(), NOTES_TXT);
    assert!(!backups_root.join(DEFAULT_DEVICE_NAME).join("escape").exists());
}

#[tokio::test]
async fn test_generic_without_config_file_succeeds_without_files() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("absent.json");
    let backups_root = temp_dir.path().join("backups");

    let mut manager = BackupManager::new(ManagerSettings::new(&backups_root));
    manager
        .register_handler(Box::new(GenericDownloadHandler::new(&config_path, http_client())))
        .unwrap();

    let report = manager.run_backups().await;
    assert_eq!(report.total(), 1);
    assert!(report.all_succeeded());

    let folder = backups_root.join(DEFAULT_DEVICE_NAME).join(DEFAULT_DEVICE_ID);
    assert_eq!(fs::read_dir(&folder).unwrap().count(), 0);
}

#[tokio::test]
async fn test_generic_config_is_reread_on_each_run() {
    let base_url = start_mock_server().await.unwrap();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("downloads.json");
    let backups_root = temp_dir.path().join("backups");

    let mut manager = BackupManager::new(ManagerSettings::new(&backups_root));
    manager
        .register_handler(Box::new(GenericDownloadHandler::new(&config_path, http_client())))
        .unwrap();

    assert!(manager.run_backups().await.all_succeeded());

    write_downloads(
        &config_path,
        &json!({ "downloads": [{ "url": format!("{base_url}/files/notes.txt"), "folder": "late" }] }),
    );

    assert!(manager.run_backups().await.all_succeeded());
    let folder = backups_root.join(DEFAULT_DEVICE_NAME).join(DEFAULT_DEVICE_ID);
    assert!(folder.join("late/notes.txt").exists());
}

#[tokio::test]
async fn test_generic_http_error_fails_handler() {
    let base_url = start_mock_server().await.unwrap();
    let temp_dir = TempDir::new().unwrap();

    let handler = GenericDownloadHandler::with_downloads(
        vec![DownloadItem::new(format!("{base_url}/missing"), "gone.bin", "broken")],
        http_client(),
    );

    let mut manager = BackupManager::new(ManagerSettings::new(temp_dir.path()));
    manager.register_handler(Box::new(handler)).unwrap();

    let report = manager.run_backups().await;
    assert_eq!(report.failed(), 1);
    assert!(!report.outcome_for(DEFAULT_DEVICE_ID).unwrap().success);
}

#[tokio::test]
async fn test_generic_first_failure_aborts_remaining_items() {
    let base_url = start_mock_server().await.unwrap();
    let temp_dir = TempDir::new().unwrap();
    let backups_root = temp_dir.path().join("backups");

    let handler = GenericDownloadHandler::with_downloads(
        vec![
            DownloadItem::new(format!("{base_url}/missing"), "a.bin", "x"),
            DownloadItem::new(format!("{base_url}/files/notes.txt"), "b.txt", "y"),
        ],
        http_client(),
    );

    let mut manager = BackupManager::new(ManagerSettings::new(&backups_root));
    manager.register_handler(Box::new(handler)).unwrap();

    let report = manager.run_backups().await;
    assert_eq!(report.failed(), 1);

    let folder = backups_root.join(DEFAULT_DEVICE_NAME).join(DEFAULT_DEVICE_ID);
    assert!(!folder.join("x/a.bin").exists());
    assert!(!folder.join("y/b.txt").exists());
}

#[tokio::test]
async fn test_config_driven_sweep_backs_up_wled_and_generic() {
    let base_url = start_mock_server().await.unwrap();
    let authority = base_url.trim_start_matches("http://").to_string();
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    let backups_root = temp_dir.path().join("backups");

    write_downloads(
        &config_dir.join(CONFIG_RELATIVE_PATH),
        &json!({ "downloads": [{ "url": format!("{base_url}/files/notes.txt"), "folder": "docs" }] }),
    );

    let config_path = temp_dir.path().join("backup-octopus.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[backup]
config_dir = "{config_dir}"
backups_root = "{backups_root}"
max_concurrency = 2
fetch_timeout_secs = 10

[[entries]]
entry_id = "wled-kitchen"
domain = "wled"
title = "Kitchen"

[entries.data]
host = "{authority}"

[[entries]]
entry_id = "wled-porch"
domain = "wled"
title = ""

[[devices]]
config_entry_id = "wled-porch"
name = "Porch"
configuration_url = "http://{authority}/"
"#,
            config_dir = config_dir.display(),
            backups_root = backups_root.display(),
        ),
    )
    .unwrap();

    let config = Config::load_from_path(config_path).unwrap();
    let metrics = Arc::new(Metrics::new());
    let (mut manager, summary) = build_manager(&config, metrics.clone()).unwrap();

    assert_eq!(summary.per_kind.get("wled"), Some(&2));
    assert_eq!(summary.per_kind.get(generic::KIND_NAME), Some(&1));
    assert_eq!(manager.len(), 3);

    let report = manager.run_backups().await;
    assert_eq!(report.total(), 3);
    assert!(report.all_succeeded(), "report: {report:?}");

    let device_id = authority.replace(':', "_");
    let kitchen = backups_root.join("Kitchen").join(&device_id);
    assert_eq!(fs::read_to_string(kitchen.join("cfg.json")).unwrap(), CFG_JSON);
    assert_eq!(fs::read_to_string(kitchen.join("presets.json")).unwrap(), PRESETS_JSON);

    let provenance: serde_json::Value =
        serde_json::from_slice(&fs::read(kitchen.join(ENTRY_FILE)).unwrap()).unwrap();
    assert_eq!(provenance["entry_id"], "wled-kitchen");

    // untitled entry falls back to the registry name
    let porch = backups_root.join("Porch").join(&device_id);
    assert!(porch.join("cfg.json").exists());

    let generic_folder = backups_root.join(DEFAULT_DEVICE_NAME).join(DEFAULT_DEVICE_ID);
    assert_eq!(fs::read_to_string(generic_folder.join("docs/notes.txt")).unwrap(), NOTES_TXT);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.runs_started, 1);
    assert_eq!(snapshot.backups_succeeded, 3);
    assert_eq!(snapshot.backups_failed, 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_sweep() {
    let base_url = start_mock_server().await.unwrap();
    let temp_dir = TempDir::new().unwrap();

    let good = GenericDownloadHandler::with_downloads(
        vec![DownloadItem::new(format!("{base_url}/files/notes.txt"), "notes.txt", "ok")],
        http_client(),
    );
    let bad = GenericDownloadHandler::with_downloads(
        vec![DownloadItem::new(format!("{base_url}/missing"), "gone.bin", "broken")],
        http_client(),
    );
    let also_good = GenericDownloadHandler::with_downloads(
        vec![DownloadItem::new(format!("{base_url}/files/firmware.bin"), "fw.bin", "ok")],
        http_client(),
    );

    let mut manager = BackupManager::new(ManagerSettings::new(temp_dir.path()).with_max_concurrency(3));
    manager
        .register_unit(BackupUnit::new(Box::new(good)).with_backup_folder(temp_dir.path().join("one")))
        .unwrap();
    manager
        .register_unit(BackupUnit::new(Box::new(bad)).with_backup_folder(temp_dir.path().join("two")))
        .unwrap();
    manager
        .register_unit(BackupUnit::new(Box::new(also_good)).with_backup_folder(temp_dir.path().join("three")))
        .unwrap();

    let report = manager.run_backups().await;
    let results: Vec<_> = report.outcomes.iter().map(|o| o.success).collect();
    assert_eq!(results, vec![true, false, true]);

    assert!(temp_dir.path().join("one/ok/notes.txt").exists());
    assert!(temp_dir.path().join("three/ok/fw.bin").exists());
}
