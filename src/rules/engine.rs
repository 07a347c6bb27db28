use crate::config::RuleConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::features::{AccountProfile, FeatureFrame, FeatureRow, ProfileTable};
use crate::records::{columns, SuspicionLevel, TimeBucket};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleFlags {
    pub high_value: bool,
    pub suspicious_hour: bool,
    pub high_frequency: bool,
    pub cluster_deviation: bool,
    pub direct_alert: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEvaluation {
    pub flags: Vec<RuleFlags>,
    /// Seconds since the same account's previous transaction
    pub time_since_previous: Vec<Option<f64>>,
}

/// Stable order by (account, timestamp); missing timestamps sort last within an account.
pub fn chronological_order(rows: &[FeatureRow]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&rows[a], &rows[b]);
        ra.account_id
            .cmp(&rb.account_id)
            .then_with(|| match (ra.timestamp, rb.timestamp) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
    order
}

/// Requires rows sorted by `chronological_order`. The first row of each account has no
/// predecessor; a missing timestamp on either side leaves the delta undefined.
pub fn time_since_previous(rows: &[FeatureRow]) -> Vec<Option<f64>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let prev = rows.get(i.checked_sub(1)?)?;
            if prev.account_id != row.account_id {
                return None;
            }
            let delta = row.timestamp? - prev.timestamp?;
            Some(delta.num_milliseconds() as f64 / 1000.0)
        })
        .collect()
}

pub fn high_value(amount: f64, profile: &AccountProfile, config: &RuleConfig) -> bool {
    profile.exceeds_baseline(amount, config.std_multiplier)
}

pub fn suspicious_hour(bucket: Option<TimeBucket>) -> bool {
    bucket == Some(TimeBucket::Madrugada)
}

pub fn high_frequency(delta: Option<f64>, config: &RuleConfig) -> bool {
    delta.is_some_and(|d| d < config.min_interval_secs)
}

/// Absent cluster suspicion never fires.
pub fn cluster_deviation(level: Option<SuspicionLevel>) -> bool {
    level.is_some_and(|l| l > SuspicionLevel::Nenhuma)
}

pub fn direct_alert(amount: f64, row: &FeatureRow, config: &RuleConfig) -> bool {
    amount > config.direct_alert_amount
        && row.weekend
        && !row.same_ownership
        && suspicious_hour(row.time_bucket)
}

pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    /// Evaluate every rule on a frame already in chronological order. `cluster_suspicion`
    /// is aligned with the frame rows.
    pub fn evaluate(
        &self,
        frame: &FeatureFrame,
        profiles: &ProfileTable,
        cluster_suspicion: &[Option<SuspicionLevel>],
    ) -> ScoringResult<RuleEvaluation> {
        if cluster_suspicion.len() != frame.len() {
            return Err(ScoringError::ShapeMismatch {
                model: "rules".into(),
                expected: format!("{} cluster suspicion values", frame.len()),
                actual: cluster_suspicion.len().to_string(),
            });
        }
        let amount = frame.column_index(columns::AMOUNT)?;
        let deltas = time_since_previous(&frame.rows);

        let flags = frame
            .rows
            .iter()
            .zip(&deltas)
            .zip(cluster_suspicion)
            .map(|((row, &delta), &level)| {
                let profile = profiles.get(&row.account_id)?;
                let value = row.values[amount];
                Ok(RuleFlags {
                    high_value: high_value(value, profile, &self.config),
                    suspicious_hour: suspicious_hour(row.time_bucket),
                    high_frequency: high_frequency(delta, &self.config),
                    cluster_deviation: cluster_deviation(level),
                    direct_alert: direct_alert(value, row, &self.config),
                })
            })
            .collect::<ScoringResult<Vec<_>>>()?;

        tracing::debug!(
            rows = flags.len(),
            direct_alerts = flags.iter().filter(|f| f.direct_alert).count(),
            "rules evaluated"
        );
        Ok(RuleEvaluation {
            flags,
            time_since_previous: deltas,
        })
    }
}
