//! Tracing setup and backup counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    runs_started: AtomicU64,
    backups_succeeded: AtomicU64,
    backups_failed: AtomicU64,
    handlers_registered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_started", "Metric incremented");
    }

    pub fn backup_succeeded(&self) {
        self.backups_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "backups_succeeded", "Metric incremented");
    }

    pub fn backup_failed(&self) {
        self.backups_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "backups_failed", "Metric incremented");
    }

    pub fn handler_registered(&self) {
        self.handlers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            backups_succeeded: self.backups_succeeded.load(Ordering::Relaxed),
            backups_failed: self.backups_failed.load(Ordering::Relaxed),
            handlers_registered: self.handlers_registered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub backups_succeeded: u64,
    pub backups_failed: u64,
    pub handlers_registered: u64,
}
