use crate::config::AnomalyConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::model::{Clusterer, ModelSet, ReconstructionModel, RepresentationEncoder};
use crate::records::SuspicionLevel;
use ndarray::{Array2, Axis};
use serde::Serialize;

/// Per-row anomaly signals, aligned with the input rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalySignals {
    pub reconstruction_error: Vec<f64>,
    pub cluster: Vec<usize>,
    pub cluster_distance: Vec<f64>,
}

impl AnomalySignals {
    pub fn len(&self) -> usize {
        self.reconstruction_error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reconstruction_error.is_empty()
    }
}

/// Batch percentiles of the reconstruction error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl GlobalThresholds {
    /// `None` when the batch has no finite error.
    pub fn from_errors(errors: &[f64], config: &AnomalyConfig) -> Option<Self> {
        Some(Self {
            low: quantile(errors, config.low_percentile)?,
            medium: quantile(errors, config.medium_percentile)?,
            high: quantile(errors, config.high_percentile)?,
        })
    }
}

/// Reconstruction-error cutoff per cluster id. Clusters with no rows in the batch have none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterThresholds {
    thresholds: Vec<Option<f64>>,
}

impl ClusterThresholds {
    pub fn build(errors: &[f64], clusters: &[usize], n_clusters: usize, q: f64) -> Self {
        let mut grouped: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];
        for (&error, &cluster) in errors.iter().zip(clusters) {
            if cluster >= grouped.len() {
                grouped.resize_with(cluster + 1, Vec::new);
            }
            grouped[cluster].push(error);
        }
        Self {
            thresholds: grouped.iter().map(|e| quantile(e, q)).collect(),
        }
    }

    pub fn get(&self, cluster: usize) -> Option<f64> {
        self.thresholds.get(cluster).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Clusters that received no rows.
    pub fn empty_clusters(&self) -> Vec<usize> {
        self.thresholds
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_none())
            .map(|(c, _)| c)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyAssessment {
    pub signals: AnomalySignals,
    pub suspicion: Vec<SuspicionLevel>,
    pub cluster_suspicion: Vec<SuspicionLevel>,
    pub global: Option<GlobalThresholds>,
    pub thresholds: ClusterThresholds,
}

pub struct AnomalyEngine<'a> {
    encoder: &'a dyn RepresentationEncoder,
    autoencoder: &'a dyn ReconstructionModel,
    clusterer: &'a dyn Clusterer,
    config: AnomalyConfig,
}

impl<'a> AnomalyEngine<'a> {
    pub fn new(
        encoder: &'a dyn RepresentationEncoder,
        autoencoder: &'a dyn ReconstructionModel,
        clusterer: &'a dyn Clusterer,
        config: AnomalyConfig,
    ) -> Self {
        Self {
            encoder,
            autoencoder,
            clusterer,
            config,
        }
    }

    pub fn from_models(models: &'a ModelSet, config: AnomalyConfig) -> Self {
        Self::new(
            models.representation_encoder.as_ref(),
            models.autoencoder.as_ref(),
            models.clusterer.as_ref(),
            config,
        )
    }

    /// Error, cluster and distance for every row of the scaled feature matrix.
    pub fn signals(&self, scaled: &Array2<f64>) -> ScoringResult<AnomalySignals> {
        if scaled.nrows() == 0 {
            return Ok(AnomalySignals::default());
        }
        let reconstructed = self.autoencoder.predict(scaled)?;
        let reconstruction_error = reconstruction_errors(scaled, &reconstructed)?;
        let embedding = self.encoder.predict(scaled)?;
        let cluster = self.clusterer.predict(&embedding)?;
        let cluster_distance = nearest_centroid_distances(&embedding, self.clusterer.centroids())?;
        if cluster.len() != scaled.nrows() {
            return Err(ScoringError::ShapeMismatch {
                model: "clusterer".into(),
                expected: format!("{} labels", scaled.nrows()),
                actual: format!("{} labels", cluster.len()),
            });
        }
        Ok(AnomalySignals {
            reconstruction_error,
            cluster,
            cluster_distance,
        })
    }

    /// Signals plus the global and cluster-relative severities of the current batch.
    pub fn assess(&self, scaled: &Array2<f64>) -> ScoringResult<AnomalyAssessment> {
        let signals = self.signals(scaled)?;
        let global = GlobalThresholds::from_errors(&signals.reconstruction_error, &self.config);
        let suspicion = signals
            .reconstruction_error
            .iter()
            .map(|&e| global.map_or(SuspicionLevel::Nenhuma, |g| global_suspicion(e, &g)))
            .collect();

        let thresholds = ClusterThresholds::build(
            &signals.reconstruction_error,
            &signals.cluster,
            self.clusterer.n_clusters(),
            self.config.cluster_quantile,
        );
        let empty = thresholds.empty_clusters();
        if !empty.is_empty() {
            tracing::debug!(?empty, "clusters without rows in this batch");
        }
        let cluster_suspicion = signals
            .reconstruction_error
            .iter()
            .zip(&signals.cluster)
            .map(|(&e, &c)| cluster_suspicion(e, thresholds.get(c), &self.config))
            .collect();

        Ok(AnomalyAssessment {
            signals,
            suspicion,
            cluster_suspicion,
            global,
            thresholds,
        })
    }
}

/// Row-wise mean squared difference.
pub fn reconstruction_errors(
    input: &Array2<f64>,
    reconstructed: &Array2<f64>,
) -> ScoringResult<Vec<f64>> {
    if input.dim() != reconstructed.dim() {
        return Err(ScoringError::ShapeMismatch {
            model: "autoencoder".into(),
            expected: format!("{:?}", input.dim()),
            actual: format!("{:?}", reconstructed.dim()),
        });
    }
    let diff = input - reconstructed;
    Ok(diff
        .map(|d| d * d)
        .mean_axis(Axis(1))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![f64::NAN; input.nrows()]))
}

/// Euclidean distance from each embedding row to its closest centroid.
pub fn nearest_centroid_distances(
    embedding: &Array2<f64>,
    centroids: &Array2<f64>,
) -> ScoringResult<Vec<f64>> {
    if embedding.ncols() != centroids.ncols() {
        return Err(ScoringError::ShapeMismatch {
            model: "representation_encoder".into(),
            expected: format!("{} latent dims", centroids.ncols()),
            actual: format!("{} latent dims", embedding.ncols()),
        });
    }
    Ok(embedding
        .outer_iter()
        .map(|point| {
            centroids
                .outer_iter()
                .map(|c| {
                    point
                        .iter()
                        .zip(c.iter())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .fold(f64::INFINITY, f64::min)
        })
        .collect())
}

/// Linearly interpolated quantile over the finite values; `None` if there are none.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Highest exceeded batch percentile wins; strictly greater.
pub fn global_suspicion(error: f64, thresholds: &GlobalThresholds) -> SuspicionLevel {
    if error > thresholds.high {
        SuspicionLevel::Alta
    } else if error > thresholds.medium {
        SuspicionLevel::Media
    } else if error > thresholds.low {
        SuspicionLevel::Baixa
    } else {
        SuspicionLevel::Nenhuma
    }
}

/// Severity relative to the row's own cluster cutoff. An undefined cutoff is `Baixa`.
pub fn cluster_suspicion(
    error: f64,
    threshold: Option<f64>,
    config: &AnomalyConfig,
) -> SuspicionLevel {
    let Some(threshold) = threshold else {
        return SuspicionLevel::Baixa;
    };
    if error > threshold * config.high_multiplier {
        SuspicionLevel::Alta
    } else if error > threshold {
        SuspicionLevel::Media
    } else if error > threshold * config.low_multiplier {
        SuspicionLevel::Baixa
    } else {
        SuspicionLevel::Nenhuma
    }
}
