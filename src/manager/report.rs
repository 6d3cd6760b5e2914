use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Result of one handler within a sweep
#[derive(Debug, Clone, Serialize)]
pub struct HandlerOutcome {
    pub device_name: String,
    pub device_id: String,
    pub folder: PathBuf,
    pub success: bool,
    pub duration_ms: u64,
}

/// Per-sweep report; outcomes are in registration order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<HandlerOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome_for(&self, device_id: &str) -> Option<&HandlerOutcome> {
        self.outcomes.iter().find(|o| o.device_id == device_id)
    }
}
