//! Wiring from loaded configuration to a ready-to-run manager

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::handlers::{DiscoveryContext, DiscoverySummary, HandlerKind, builtin_kinds, discover, generic};
use crate::http::{FetchError, HttpClient};
use crate::manager::{BackupManager, ManagerError};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] FetchError),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Built-in kinds minus the ones switched off in configuration
pub fn enabled_kinds(config: &Config) -> Vec<HandlerKind> {
    builtin_kinds()
        .into_iter()
        .filter(|kind| config.generic.enabled || kind.name != generic::KIND_NAME)
        .collect()
}

/// Discover handlers for every enabled kind and register them
pub fn build_manager(
    config: &Config,
    metrics: Arc<Metrics>,
) -> Result<(BackupManager, DiscoverySummary), AppError> {
    let http = HttpClient::new(&config.http_config())?;
    let host = config.host_context();
    let kinds = enabled_kinds(config);

    let ctx = DiscoveryContext {
        host: &host,
        http: &http,
    };
    let report = discover(&kinds, &ctx);

    for err in &report.summary.errors {
        warn!(error = %err, "Discovery error");
    }

    let mut manager = BackupManager::with_metrics(config.manager_settings(), metrics);
    for handler in report.handlers {
        manager.register_handler(handler)?;
    }

    info!(
        handlers = manager.len(),
        backups_root = %manager.settings().backups_root.display(),
        "Backup manager ready"
    );

    Ok((manager, report.summary))
}
