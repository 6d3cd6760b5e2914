//! Backup manager - owns registered handlers and runs backup sweeps
//!
//! Lifecycle: `Idle` → `Running` → `Idle` for each sweep, `Shutdown` once
//! [`BackupManager::shutdown`] has released every handler. Registration and
//! sweeps take `&mut self`, so callers serialize them.

mod report;
mod unit;

pub use report::{HandlerOutcome, RunReport};
pub use unit::{BackupUnit, ENTRY_FILE};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::handlers::{BackupHandler, DeviceIdentity};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("backup manager has been shut down")]
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Running,
    Shutdown,
}

/// Settings for backup sweeps
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub backups_root: PathBuf,
    /// Upper bound for a single handler's fetch
    pub fetch_timeout: Option<Duration>,
    /// Handlers backed up in parallel; 1 keeps the sweep sequential
    pub max_concurrency: usize,
}

impl ManagerSettings {
    pub fn new(backups_root: impl Into<PathBuf>) -> Self {
        Self {
            backups_root: backups_root.into(),
            fetch_timeout: None,
            max_concurrency: 1,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

pub struct BackupManager {
    settings: Arc<ManagerSettings>,
    units: Vec<Arc<BackupUnit>>,
    state: ManagerState,
    metrics: Arc<Metrics>,
}

impl BackupManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_metrics(settings, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(settings: ManagerSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            settings: Arc::new(settings),
            units: Vec::new(),
            state: ManagerState::Idle,
            metrics,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Registered identities in registration order
    pub fn identities(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.units.iter().map(|unit| unit.identity())
    }

    pub fn register_handler(&mut self, handler: Box<dyn BackupHandler>) -> Result<(), ManagerError> {
        self.register_unit(BackupUnit::new(handler))
    }

    /// Append a unit; duplicates are kept and both run
    pub fn register_unit(&mut self, unit: BackupUnit) -> Result<(), ManagerError> {
        if self.state == ManagerState::Shutdown {
            return Err(ManagerError::ShutDown);
        }

        let identity = unit.identity();
        if self
            .identities()
            .any(|existing| existing.device_id() == identity.device_id())
        {
            warn!(
                device_name = identity.device_name(),
                device_id = identity.device_id(),
                "Handler with this device_id already registered; both backups will run"
            );
        }

        debug!(
            device_name = identity.device_name(),
            device_id = identity.device_id(),
            "Handler registered"
        );
        self.units.push(Arc::new(unit));
        self.metrics.handler_registered();
        Ok(())
    }

    /// Back up every registered handler
    ///
    /// A failing or panicking handler is recorded as a failed outcome and the
    /// sweep continues.
    pub async fn run_backups(&mut self) -> RunReport {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();

        if self.state == ManagerState::Shutdown {
            warn!(%run_id, "Backup run requested after shutdown; nothing to do");
            return RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                outcomes: Vec::new(),
            };
        }

        self.metrics.run_started();

        let units = self.units.clone();
        let settings = self.settings.clone();
        let metrics = self.metrics.clone();
        // back to Idle even if this future is dropped mid-sweep
        let _running = RunningGuard::enter(&mut self.state);

        let span = info_span!("backup_run", %run_id);
        let outcomes = async {
            info!(
                handlers = units.len(),
                max_concurrency = settings.max_concurrency,
                "Backup run started"
            );

            if settings.max_concurrency > 1 {
                run_concurrent(&units, &settings).await
            } else {
                run_sequential(&units, &settings).await
            }
        }
        .instrument(span)
        .await;

        for outcome in &outcomes {
            if outcome.success {
                metrics.backup_succeeded();
            } else {
                metrics.backup_failed();
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Backup run finished"
        );

        report
    }

    /// Release handler resources and clear the handler set
    pub async fn shutdown(&mut self) {
        let units: Vec<_> = self.units.drain(..).collect();
        info!(handlers = units.len(), "Shutting down backup handlers");

        for unit in units {
            if unit.handler().as_shutdown().is_none() {
                continue;
            }

            let device_id = unit.identity().device_id().to_string();
            let task = tokio::spawn(
                async move {
                    match unit.handler().as_shutdown() {
                        Some(capability) => capability.shutdown().await,
                        None => Ok(()),
                    }
                }
                .in_current_span(),
            );

            match task.await {
                Ok(Ok(())) => debug!(%device_id, "Handler shut down"),
                Ok(Err(err)) => warn!(%device_id, error = %err, "Handler shutdown failed"),
                Err(err) => error!(%device_id, error = %err, "Handler shutdown task aborted"),
            }
        }

        self.state = ManagerState::Shutdown;
    }
}

/// Holds the manager in `Running` for the duration of a sweep
struct RunningGuard<'a> {
    state: &'a mut ManagerState,
}

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a mut ManagerState) -> Self {
        *state = ManagerState::Running;
        Self { state }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.state = ManagerState::Idle;
    }
}

async fn run_sequential(units: &[Arc<BackupUnit>], settings: &Arc<ManagerSettings>) -> Vec<HandlerOutcome> {
    let mut outcomes = Vec::with_capacity(units.len());
    for unit in units {
        outcomes.push(run_isolated(unit.clone(), settings.clone()).await);
    }
    outcomes
}

async fn run_concurrent(units: &[Arc<BackupUnit>], settings: &Arc<ManagerSettings>) -> Vec<HandlerOutcome> {
    let permits = Arc::new(Semaphore::new(settings.max_concurrency));

    let tasks: Vec<_> = units
        .iter()
        .map(|unit| {
            let unit = unit.clone();
            let settings = settings.clone();
            let permits = permits.clone();
            tokio::spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    run_isolated(unit, settings).await
                }
                .in_current_span(),
            )
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (unit, task) in units.iter().zip(tasks) {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(device_id = unit.identity().device_id(), error = %err, "Backup task aborted");
                failed_outcome(unit, settings, Duration::ZERO)
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Run one unit on its own task so a panic only fails that unit
async fn run_isolated(unit: Arc<BackupUnit>, settings: Arc<ManagerSettings>) -> HandlerOutcome {
    let started = Instant::now();
    let task_unit = unit.clone();
    let task_settings = settings.clone();

    let result = tokio::spawn(
        async move {
            task_unit
                .run_backup(&task_settings.backups_root, task_settings.fetch_timeout)
                .await
        }
        .in_current_span(),
    )
    .await;

    match result {
        Ok(success) => HandlerOutcome {
            device_name: unit.identity().device_name().to_string(),
            device_id: unit.identity().device_id().to_string(),
            folder: unit.backup_folder(&settings.backups_root),
            success,
            duration_ms: elapsed_ms(started),
        },
        Err(err) => {
            error!(
                device_name = unit.identity().device_name(),
                device_id = unit.identity().device_id(),
                error = %err,
                "Backup task aborted"
            );
            failed_outcome(&unit, &settings, started.elapsed())
        }
    }
}

fn failed_outcome(unit: &BackupUnit, settings: &ManagerSettings, elapsed: Duration) -> HandlerOutcome {
    HandlerOutcome {
        device_name: unit.identity().device_name().to_string(),
        device_id: unit.identity().device_id().to_string(),
        folder: unit.backup_folder(&settings.backups_root),
        success: false,
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
