use super::StageSummary;
use crate::anomaly::{AnomalyEngine, AnomalySignals};
use crate::config::ScoringConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::features::{FeatureFrame, ProfileTable};
use crate::labels::{LabelSynthesizer, SyntheticLabels};
use crate::model::ModelSet;
use crate::records::{columns, format_flag, format_number, SuspicionLevel, Table};
use crate::risk::{FusionEngine, FusionInput, Verdict};
use crate::rules::{chronological_order, RuleEngine, RuleEvaluation};
use std::path::Path;
use tracing::{info, warn};

/// Stage-two output: the chronologically sorted input with every derived column appended.
#[derive(Debug, Clone)]
pub struct AnalyzedBatch {
    pub table: Table,
    pub signals: AnomalySignals,
    pub rules: RuleEvaluation,
    pub labels: SyntheticLabels,
    pub verdicts: Vec<Verdict>,
    pub accounts: usize,
    pub invalid_timestamps: usize,
}

impl AnalyzedBatch {
    /// Rows with a positive final decision.
    pub fn alerts(&self) -> Table {
        let keep: Vec<bool> = self.verdicts.iter().map(|v| v.final_decision).collect();
        self.table.filter(&keep)
    }

    pub fn alert_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.final_decision).count()
    }
}

pub struct DetectionStage<'a> {
    models: &'a ModelSet,
    config: &'a ScoringConfig,
}

impl<'a> DetectionStage<'a> {
    pub fn new(models: &'a ModelSet, config: &'a ScoringConfig) -> Self {
        Self { models, config }
    }

    pub fn score(&self, mut table: Table) -> ScoringResult<AnalyzedBatch> {
        let (mut frame, invalid_timestamps) = FeatureFrame::from_table(&table)?;
        if invalid_timestamps > 0 {
            warn!(
                count = invalid_timestamps,
                "unparseable timestamps kept as missing"
            );
        }
        let order = chronological_order(&frame.rows);
        frame.permute(&order);
        table.permute(&order);

        let profiles = ProfileTable::from_table(&table)?;
        let cluster_suspicion: Vec<Option<SuspicionLevel>> =
            match table.column(columns::CLUSTER_SUSPICION) {
                Some(c) => (0..table.len())
                    .map(|r| SuspicionLevel::parse(table.cell(r, c)))
                    .collect(),
                None => {
                    warn!(
                        column = columns::CLUSTER_SUSPICION,
                        "column absent; cluster deviation rule disabled"
                    );
                    vec![None; table.len()]
                }
            };

        // persisted feature columns are already scaled
        let scaled = frame.matrix(self.models.scaler.columns())?;
        let signals = AnomalyEngine::from_models(self.models, self.config.anomaly.clone())
            .signals(&scaled)?;
        frame.set_column(columns::RECONSTRUCTION_ERROR, &signals.reconstruction_error);
        frame.set_column(columns::CLUSTER_DISTANCE, &signals.cluster_distance);

        let rules = RuleEngine::new(self.config.rules.clone()).evaluate(
            &frame,
            &profiles,
            &cluster_suspicion,
        )?;
        let labels = LabelSynthesizer::new(self.config.labels.clone()).synthesize(&rules.flags);
        let probabilities = self.probabilities(&frame)?;

        let inputs: Vec<FusionInput> = (0..frame.len())
            .map(|i| FusionInput {
                probability: probabilities[i],
                reconstruction_error: signals.reconstruction_error[i],
                cluster_distance: signals.cluster_distance[i],
                rules: rules.flags[i],
                confirmed_anomaly: labels.labels[i],
            })
            .collect();
        let verdicts = FusionEngine::new(self.config.fusion.clone()).decide(&inputs);

        append_columns(&mut table, &signals, &rules, &labels, &verdicts);
        info!(columns = ?table.headers, "analyzed table assembled");

        Ok(AnalyzedBatch {
            accounts: frame.account_count(),
            table,
            signals,
            rules,
            labels,
            verdicts,
            invalid_timestamps,
        })
    }

    fn probabilities(&self, frame: &FeatureFrame) -> ScoringResult<Vec<f64>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let input = frame.matrix(&self.config.fusion.classifier_columns)?;
        let probabilities = self.models.classifier.predict_probability(&input)?;
        if probabilities.len() != frame.len() {
            return Err(ScoringError::ShapeMismatch {
                model: "classifier".into(),
                expected: format!("{} probabilities", frame.len()),
                actual: probabilities.len().to_string(),
            });
        }
        Ok(probabilities)
    }

    /// Score the stage-one table at `input`; both outputs are written only once every
    /// row has been scored.
    pub fn run(
        &self,
        input: &Path,
        analyzed_out: &Path,
        alerts_out: &Path,
    ) -> ScoringResult<StageSummary> {
        info!(input = %input.display(), "detection stage reading profiled transactions");
        let analyzed = self.score(Table::read(input)?)?;
        let alerts = analyzed.alerts();
        analyzed.table.write(analyzed_out)?;
        alerts.write(alerts_out)?;

        info!(
            analyzed = %analyzed_out.display(),
            alerts = %alerts_out.display(),
            alert_rows = alerts.len(),
            "analyzed transactions written"
        );
        let mut summary = StageSummary::new(
            "anomaly",
            analyzed.table.len(),
            analyzed.accounts,
            analyzed.invalid_timestamps,
        );
        summary.alerts = Some(analyzed.alert_count());
        summary.critical = Some(analyzed.verdicts.iter().filter(|v| v.critical_risk).count());
        summary.confirmed = Some(analyzed.labels.positives());
        Ok(summary)
    }
}

fn append_columns(
    table: &mut Table,
    signals: &AnomalySignals,
    rules: &RuleEvaluation,
    labels: &SyntheticLabels,
    verdicts: &[Verdict],
) {
    let numbers = |v: &[f64]| v.iter().map(|&x| format_number(x)).collect::<Vec<_>>();
    let flags = |f: &dyn Fn(usize) -> bool| {
        (0..verdicts.len())
            .map(|i| format_flag(f(i)))
            .collect::<Vec<_>>()
    };

    table.set_column(
        columns::RECONSTRUCTION_ERROR,
        numbers(&signals.reconstruction_error[..]),
    );
    table.set_column(columns::CLUSTER_DISTANCE, numbers(&signals.cluster_distance[..]));
    table.set_column(
        columns::TIME_SINCE_PREVIOUS,
        rules
            .time_since_previous
            .iter()
            .map(|d| d.map(format_number).unwrap_or_default())
            .collect(),
    );
    table.set_column(columns::RULE_HIGH_VALUE, flags(&|i: usize| rules.flags[i].high_value));
    table.set_column(
        columns::RULE_SUSPICIOUS_HOUR,
        flags(&|i: usize| rules.flags[i].suspicious_hour),
    );
    table.set_column(
        columns::RULE_HIGH_FREQUENCY,
        flags(&|i: usize| rules.flags[i].high_frequency),
    );
    table.set_column(
        columns::RULE_CLUSTER,
        flags(&|i: usize| rules.flags[i].cluster_deviation),
    );
    table.set_column(
        columns::FRAUD_SCORE,
        labels.scores.iter().map(u32::to_string).collect(),
    );
    table.set_column(columns::CONFIRMED_ANOMALY, flags(&|i: usize| labels.labels[i]));
    table.set_column(
        columns::MODEL_PROBABILITY,
        verdicts
            .iter()
            .map(|v| format_number(v.model_probability))
            .collect(),
    );
    table.set_column(
        columns::MODEL_PREDICTION,
        flags(&|i: usize| verdicts[i].model_prediction),
    );
    table.set_column(
        columns::RULE_DIRECT_ALERT,
        flags(&|i: usize| rules.flags[i].direct_alert),
    );
    table.set_column(columns::FINAL_DECISION, flags(&|i: usize| verdicts[i].final_decision));
    table.set_column(
        columns::SUSPICION_LEVEL,
        verdicts
            .iter()
            .map(|v| v.suspicion.as_str().to_string())
            .collect(),
    );
    table.set_column(columns::CRITICAL_RISK, flags(&|i: usize| verdicts[i].critical_risk));
    table.set_column(
        columns::RATIONALE,
        verdicts.iter().map(|v| v.rationale.to_string()).collect(),
    );
    table.set_column(
        columns::SCORE,
        verdicts.iter().map(|v| format_number(v.score)).collect(),
    );
    table.set_column(
        columns::RISK_BAND,
        verdicts
            .iter()
            .map(|v| v.band.map(|b| b.as_str().to_string()).unwrap_or_default())
            .collect(),
    );
}
