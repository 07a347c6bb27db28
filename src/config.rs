//! Scoring configuration. Every threshold used by the pipeline is a field here;
//! the defaults are the production values.

use crate::error::ScoringResult;
use crate::records::columns;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Pre-fitted model artifacts
    pub artifacts: ArtifactsConfig,
    /// Input and output tables
    pub io: IoConfig,
    /// Feature derivation
    pub features: FeaturesConfig,
    /// Representation anomaly thresholds
    pub anomaly: AnomalyConfig,
    /// Heuristic rule thresholds
    pub rules: RuleConfig,
    /// Synthetic label generation
    pub labels: LabelConfig,
    /// Signal fusion and decision policy
    pub fusion: FusionConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory holding every artifact below
    pub dir: PathBuf,
    pub scaler: String,
    pub type_encoder: String,
    pub weekday_encoder: String,
    pub time_bucket_encoder: String,
    /// ONNX representation encoder (latent embedding)
    pub representation_encoder: String,
    /// ONNX autoencoder (reconstruction)
    pub autoencoder: String,
    /// k-means centroids
    pub clusterer: String,
    /// ONNX supervised classifier
    pub classifier: String,
}

impl ArtifactsConfig {
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Raw transactions consumed by the behavior stage
    pub raw_transactions: PathBuf,
    /// Behavior stage output, consumed by the anomaly stage
    pub profiled_transactions: PathBuf,
    /// Full annotated set
    pub analyzed_transactions: PathBuf,
    /// Subset with a positive final decision
    pub alert_log: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Raw columns, beyond amount and ownership, carried into the numeric frame
    pub extra_numeric_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Batch percentile of reconstruction error above which suspicion is `baixa`
    pub low_percentile: f64,
    pub medium_percentile: f64,
    pub high_percentile: f64,
    /// Per-cluster error quantile used as the cluster threshold
    pub cluster_quantile: f64,
    /// Error above `threshold * high_multiplier` is `alta`
    pub high_multiplier: f64,
    /// Error above `threshold * low_multiplier` is `baixa`
    pub low_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Amount above `mean + std_multiplier * std` is high value
    pub std_multiplier: f64,
    /// Gap to the previous transaction of the same account, in seconds
    pub min_interval_secs: f64,
    /// Normalized amount cut-off of the direct alert rule
    pub direct_alert_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Fraction of rows flipped in each direction
    pub noise_rate: f64,
    pub seed: u64,
    /// Weighted rule score at or above which a row is a confirmed anomaly
    pub min_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Classifier probability at or above which the model flags a row
    pub probability_threshold: f64,
    /// Ordered classifier input columns
    pub classifier_columns: Vec<String>,
    pub weights: ScoreWeights,
    /// Reconstruction error cited as "high"
    pub error_threshold: f64,
    /// Cluster distance cited as "high"
    pub distance_threshold: f64,
    pub severe_error_threshold: f64,
    pub severe_distance_threshold: f64,
    /// Upper edge of `baixo`
    pub moderate_band: f64,
    /// Upper edge of `moderado`
    pub high_band: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub model: f64,
    pub high_value: f64,
    pub suspicious_hour: f64,
    pub high_frequency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("modelos"),
            scaler: "scaler.json".to_string(),
            type_encoder: "encoder_tipo_transacao.json".to_string(),
            weekday_encoder: "encoder_semana.json".to_string(),
            time_bucket_encoder: "encoder_horario.json".to_string(),
            representation_encoder: "modelo_encoder.onnx".to_string(),
            autoencoder: "modelo_autoencoder.onnx".to_string(),
            clusterer: "kmeans_auto.json".to_string(),
            classifier: "modelo_xgb.onnx".to_string(),
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            raw_transactions: PathBuf::from("dados/transacoes_final_fraude.csv"),
            profiled_transactions: PathBuf::from(
                "resultados/transacoes_com_comportamento_por_conta.csv",
            ),
            analyzed_transactions: PathBuf::from("resultados/transacoes_analisadas.csv"),
            alert_log: PathBuf::from("resultados/transacoes_anomalas_log.csv"),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            low_percentile: 0.75,
            medium_percentile: 0.90,
            high_percentile: 0.95,
            cluster_quantile: 0.95,
            high_multiplier: 1.5,
            low_multiplier: 0.5,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            std_multiplier: 3.0,
            min_interval_secs: 60.0,
            direct_alert_amount: 0.8,
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            noise_rate: 0.005,
            seed: 42,
            min_score: 3,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 0.6,
            classifier_columns: columns::CLASSIFIER_INPUT
                .iter()
                .map(|c| c.to_string())
                .collect(),
            weights: ScoreWeights::default(),
            error_threshold: 0.1,
            distance_threshold: 10.0,
            severe_error_threshold: 0.2,
            severe_distance_threshold: 15.0,
            moderate_band: 0.4,
            high_band: 0.7,
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            model: 0.5,
            high_value: 0.2,
            suspicious_hour: 0.2,
            high_frequency: 0.1,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ScoringConfig {
    /// Load from a JSON file. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> ScoringResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
