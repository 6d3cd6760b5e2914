use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::manager::{BackupManager, ManagerState, RunReport};
use crate::observability::Metrics;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Mutex<BackupManager>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(manager: BackupManager) -> Self {
        let metrics = manager.metrics().clone();
        Self {
            manager: Arc::new(Mutex::new(manager)),
            metrics,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("a backup run is already in progress")]
    RunInProgress,
    #[error("backup manager has been shut down")]
    ShutDown,
    #[error("backup run aborted: {0}")]
    RunAborted(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RunInProgress => StatusCode::CONFLICT,
            ApiError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RunAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RunInProgress => "RUN_IN_PROGRESS",
            ApiError::ShutDown => "SHUT_DOWN",
            ApiError::RunAborted(_) => "RUN_ABORTED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });

        (self.status_code(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/backups/run", post(run_backups))
        .with_state(state)
}

pub async fn run(address: SocketAddr, state: AppState) -> Result<(), AnyError> {
    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "backup-octopus server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // waits for any in-flight sweep before releasing handlers
    state.manager.lock().await.shutdown().await;
    info!("Backup manager shut down");

    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, handlers) = match state.manager.try_lock() {
        Ok(manager) => {
            let status = match manager.state() {
                ManagerState::Shutdown => "shutdown",
                _ => "idle",
            };
            (status, Some(manager.len()))
        }
        Err(_) => ("running", None),
    };

    let code = if status == "shutdown" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = json!({
        "status": status,
        "handlers": handlers,
        "metrics": state.metrics.snapshot(),
    });

    (code, Json(body))
}

async fn run_backups(State(state): State<AppState>) -> Result<Json<RunReport>, ApiError> {
    let mut manager = state
        .manager
        .clone()
        .try_lock_owned()
        .map_err(|_| ApiError::RunInProgress)?;

    if manager.state() == ManagerState::Shutdown {
        return Err(ApiError::ShutDown);
    }

    // the sweep owns the lock and outlives a disconnected client
    let sweep = tokio::spawn(async move { manager.run_backups().await });
    let report = sweep
        .await
        .map_err(|e| ApiError::RunAborted(e.to_string()))?;

    Ok(Json(report))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
