#![allow(dead_code)]

use axum::{Router, http::StatusCode, routing::get};
use bytes::Bytes;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

use backup_octopus::http::{HttpClient, HttpConfig};

pub const FIRMWARE_BIN: &[u8] = &[0x57, 0x4c, 0x45, 0x44, 0x00, 0xff, 0x10, 0x80];
pub const NOTES_TXT: &str = "router settings exported 2026-01-01\n";
pub const CFG_JSON: &str = r#"{"id":{"name":"Kitchen"},"nw":{"ins":[{"ssid":"home"}]}}"#;
pub const PRESETS_JSON: &str = r#"{"0":{},"1":{"n":"Warm white","bri":128}}"#;

/// Start an in-process HTTP server serving fixed payloads
///
/// Returns the base URL, e.g. `http://127.0.0.1:41235`.
pub async fn start_mock_server() -> Result<String, Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/files/firmware.bin", get(|| async { Bytes::from_static(FIRMWARE_BIN) }))
        .route("/files/notes.txt", get(|| async { NOTES_TXT }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "not found") }))
        .route("/cfg.json", get(|| async { CFG_JSON }))
        .route("/presets.json", get(|| async { PRESETS_JSON }))
        .route("/health", get(|| async { "OK" }));

    // Bind to random available port
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Wait a bit for server to start
    sleep(Duration::from_millis(100)).await;

    Ok(format!("http://{}", bound_addr))
}

pub fn http_client() -> HttpClient {
    HttpClient::new(&HttpConfig {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        ..HttpConfig::default()
    })
    .unwrap()
}

pub fn write_downloads(path: &Path, document: &serde_json::Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
}
