//! The two batch stages: behavior inference persists features, anomaly signals and
//! account baselines; detection reads that output back and scores every transaction.

mod behavior;
mod detection;

pub use behavior::{BehaviorStage, ProfiledBatch};
pub use detection::{AnalyzedBatch, DetectionStage};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub run_id: Uuid,
    pub stage: &'static str,
    pub rows: usize,
    pub accounts: usize,
    pub invalid_timestamps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<usize>,
    pub finished_at: DateTime<Utc>,
}

impl StageSummary {
    pub(crate) fn new(stage: &'static str, rows: usize, accounts: usize, invalid: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage,
            rows,
            accounts,
            invalid_timestamps: invalid,
            alerts: None,
            critical: None,
            confirmed: None,
            finished_at: Utc::now(),
        }
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            stage = self.stage,
            rows = self.rows,
            accounts = self.accounts,
            invalid_timestamps = self.invalid_timestamps,
            alerts = ?self.alerts,
            critical = ?self.critical,
            confirmed = ?self.confirmed,
            "stage complete"
        );
    }
}
