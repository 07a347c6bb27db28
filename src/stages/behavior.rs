use super::StageSummary;
use crate::anomaly::{AnomalyAssessment, AnomalyEngine};
use crate::config::ScoringConfig;
use crate::error::ScoringResult;
use crate::features::{BehaviorProfiler, FeatureBuilder, FeatureFrame, ProfileTable};
use crate::model::ModelSet;
use crate::records::{columns, format_number, format_timestamp, RawBatch, Table};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Stage-one output: features, anomaly signals and the joined account baselines.
#[derive(Debug, Clone)]
pub struct ProfiledBatch {
    pub frame: FeatureFrame,
    pub assessment: AnomalyAssessment,
    pub profiles: ProfileTable,
    /// Raw header in ingestion order; these columns lead the persisted table
    pub source_columns: Vec<String>,
    pub invalid_timestamps: usize,
}

impl ProfiledBatch {
    /// Distinct account ids in first-seen order.
    pub fn account_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.frame
            .rows
            .iter()
            .map(|r| r.account_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// One row per transaction with every profile column left-joined on the account. Raw
    /// columns keep their ingested positions; derived columns follow.
    pub fn to_table(&self) -> ScoringResult<Table> {
        let mut headers: Vec<String> = [
            columns::ACCOUNT,
            columns::TIMESTAMP,
            columns::KIND,
            columns::WEEKDAY,
            columns::TIME_BUCKET,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        headers.extend(self.frame.columns.iter().cloned());
        headers.extend(
            [
                columns::RECONSTRUCTION_ERROR,
                columns::CLUSTER,
                columns::CLUSTER_DISTANCE,
                columns::SUSPICION,
                columns::CLUSTER_SUSPICION,
            ]
            .iter()
            .map(|c| c.to_string()),
        );
        headers.extend(self.profiles.columns());

        // raw columns whose names clash with a derived one are superseded
        let passthrough: Vec<usize> = (0..self.frame.passthrough_columns.len())
            .filter(|&i| !headers.contains(&self.frame.passthrough_columns[i]))
            .collect();
        headers.extend(
            passthrough
                .iter()
                .map(|&i| self.frame.passthrough_columns[i].clone()),
        );

        let signals = &self.assessment.signals;
        let mut table = Table::new(headers);
        for (i, row) in self.frame.rows.iter().enumerate() {
            let mut cells = vec![
                row.account_id.clone(),
                format_timestamp(row.timestamp),
                row.kind.clone(),
                row.weekday.map(|d| d.as_str().to_string()).unwrap_or_default(),
                row.time_bucket
                    .map(|b| b.as_str().to_string())
                    .unwrap_or_default(),
            ];
            cells.extend(row.values.iter().map(|&v| format_number(v)));
            cells.extend([
                format_number(signals.reconstruction_error[i]),
                signals.cluster[i].to_string(),
                format_number(signals.cluster_distance[i]),
                self.assessment.suspicion[i].as_str().to_string(),
                self.assessment.cluster_suspicion[i].as_str().to_string(),
            ]);
            cells.extend(self.profiles.cells(&row.account_id)?);
            cells.extend(passthrough.iter().map(|&c| row.passthrough[c].clone()));
            table.rows.push(cells);
        }
        table.lead_with(&self.source_columns);
        Ok(table)
    }
}

pub struct BehaviorStage<'a> {
    models: &'a ModelSet,
    config: &'a ScoringConfig,
}

impl<'a> BehaviorStage<'a> {
    pub fn new(models: &'a ModelSet, config: &'a ScoringConfig) -> Self {
        Self { models, config }
    }

    pub fn score(&self, batch: RawBatch) -> ScoringResult<ProfiledBatch> {
        let invalid_timestamps = batch.invalid_timestamps;
        let source_columns = batch.source_columns.clone();
        let frame = FeatureBuilder::from_models(self.models).build(batch)?;

        let scaled = frame.matrix(self.models.scaler.columns())?;
        let assessment =
            AnomalyEngine::from_models(self.models, self.config.anomaly.clone()).assess(&scaled)?;

        let kinds = self.models.type_encoder.categories().to_vec();
        let profiles = BehaviorProfiler::new(kinds).profile(&frame)?;

        Ok(ProfiledBatch {
            frame,
            assessment,
            profiles,
            source_columns,
            invalid_timestamps,
        })
    }

    /// Read raw transactions from `input`, score them and write the profiled table.
    pub fn run(&self, input: &Path, output: &Path) -> ScoringResult<StageSummary> {
        info!(input = %input.display(), "behavior stage reading transactions");
        let table = Table::read(input)?;
        let batch = RawBatch::from_table(&table, &self.config.features.extra_numeric_columns)?;
        let scored = self.score(batch)?;
        scored.to_table()?.write(output)?;

        let accounts = scored.account_ids();
        let sample: Vec<&str> = accounts.iter().take(10).copied().collect();
        info!(
            output = %output.display(),
            accounts = accounts.len(),
            sample = ?sample,
            "profiled transactions written"
        );
        Ok(StageSummary::new(
            "behavior",
            scored.frame.len(),
            accounts.len(),
            scored.invalid_timestamps,
        ))
    }
}
