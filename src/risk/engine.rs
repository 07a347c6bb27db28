//! Fuses classifier probability, anomaly signals and rule flags into a decision, a
//! batch-normalized score, a risk band and a rationale.

use crate::config::FusionConfig;
use crate::records::SuspicionLevel;
use crate::rules::RuleFlags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Baixo,
    Moderado,
    Alto,
}

impl RiskBand {
    /// Half-open bands (-0.01, moderate], (moderate, high], (high, 1.0]. Scores outside
    /// (-0.01, 1.0] have no band.
    pub fn from_score(score: f64, config: &FusionConfig) -> Option<Self> {
        if !(score > -0.01 && score <= 1.0) {
            None
        } else if score <= config.moderate_band {
            Some(RiskBand::Baixo)
        } else if score <= config.high_band {
            Some(RiskBand::Moderado)
        } else {
            Some(RiskBand::Alto)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBand::Baixo => "baixo",
            RiskBand::Moderado => "moderado",
            RiskBand::Alto => "alto",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert reasons, in the fixed order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Reason {
    Model,
    HighError,
    HighDistance,
    HighValue,
    SuspiciousHour,
    HighFrequency,
    ClusterDeviation,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Model => "modelo",
            Reason::HighError => "erro alto",
            Reason::HighDistance => "distância alta",
            Reason::HighValue => "valor alto",
            Reason::SuspiciousHour => "horário suspeito",
            Reason::HighFrequency => "frequência alta",
            Reason::ClusterDeviation => "desvio do cluster",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rationale(Vec<Reason>);

impl Rationale {
    pub const NO_ALERT: &'static str = "sem alerta";

    pub fn reasons(&self) -> &[Reason] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(Self::NO_ALERT);
        }
        for (i, reason) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(reason.as_str())?;
        }
        Ok(())
    }
}

/// Every signal the fusion of one row reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionInput {
    pub probability: f64,
    pub reconstruction_error: f64,
    pub cluster_distance: f64,
    pub rules: RuleFlags,
    /// Synthetic evaluation label
    pub confirmed_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub model_probability: f64,
    pub model_prediction: bool,
    pub final_decision: bool,
    /// Batch-normalized, in [0, 1]
    pub score: f64,
    pub band: Option<RiskBand>,
    pub suspicion: SuspicionLevel,
    pub critical_risk: bool,
    pub rationale: Rationale,
}

pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn model_prediction(&self, probability: f64) -> bool {
        probability >= self.config.probability_threshold
    }

    /// Weighted sum before batch normalization.
    pub fn raw_score(&self, model_prediction: bool, rules: &RuleFlags) -> f64 {
        let w = &self.config.weights;
        let on = |flag: bool| if flag { 1.0 } else { 0.0 };
        w.model * on(model_prediction)
            + w.high_value * on(rules.high_value)
            + w.suspicious_hour * on(rules.suspicious_hour)
            + w.high_frequency * on(rules.high_frequency)
    }

    fn high_error(&self, error: f64) -> bool {
        error > self.config.error_threshold
    }

    fn high_distance(&self, distance: f64) -> bool {
        distance > self.config.distance_threshold
    }

    /// First matching condition wins.
    pub fn suspicion(&self, error: f64, distance: f64, model_prediction: bool) -> SuspicionLevel {
        if error > self.config.severe_error_threshold
            && distance > self.config.severe_distance_threshold
        {
            SuspicionLevel::Alta
        } else if self.high_error(error) || self.high_distance(distance) {
            SuspicionLevel::Media
        } else if model_prediction {
            SuspicionLevel::Baixa
        } else {
            SuspicionLevel::Nenhuma
        }
    }

    pub fn rationale(&self, input: &FusionInput, model_prediction: bool) -> Rationale {
        let checks = [
            (model_prediction, Reason::Model),
            (self.high_error(input.reconstruction_error), Reason::HighError),
            (self.high_distance(input.cluster_distance), Reason::HighDistance),
            (input.rules.high_value, Reason::HighValue),
            (input.rules.suspicious_hour, Reason::SuspiciousHour),
            (input.rules.high_frequency, Reason::HighFrequency),
            (input.rules.cluster_deviation, Reason::ClusterDeviation),
        ];
        Rationale(
            checks
                .into_iter()
                .filter(|(fired, _)| *fired)
                .map(|(_, reason)| reason)
                .collect(),
        )
    }

    /// Verdicts for a whole batch; the score is normalized by the batch maximum.
    pub fn decide(&self, inputs: &[FusionInput]) -> Vec<Verdict> {
        let predictions: Vec<bool> = inputs
            .iter()
            .map(|i| self.model_prediction(i.probability))
            .collect();
        let raw: Vec<f64> = inputs
            .iter()
            .zip(&predictions)
            .map(|(i, &p)| self.raw_score(p, &i.rules))
            .collect();
        let scores = normalize_scores(&raw);

        inputs
            .iter()
            .zip(predictions)
            .zip(scores)
            .map(|((input, model_prediction), score)| {
                let final_decision = model_prediction || input.rules.direct_alert;
                let anomalous = self.high_error(input.reconstruction_error)
                    || self.high_distance(input.cluster_distance);
                Verdict {
                    model_probability: input.probability,
                    model_prediction,
                    final_decision,
                    score,
                    band: RiskBand::from_score(score, &self.config),
                    suspicion: self.suspicion(
                        input.reconstruction_error,
                        input.cluster_distance,
                        model_prediction,
                    ),
                    critical_risk: input.confirmed_anomaly && !final_decision && anomalous,
                    rationale: self.rationale(input, model_prediction),
                }
            })
            .collect()
    }
}

/// Divide by the batch maximum; an all-zero (or empty) batch stays all zero.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|s| s / max).collect()
}
