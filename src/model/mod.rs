//! Pre-fitted scoring models. Every model is an opaque, frozen function over a numeric
//! batch; nothing here trains or mutates a model.

mod artifacts;
mod onnx;

pub use artifacts::{ColumnScaler, KMeansClusterer, OneHotEncoder, ScalerParams};
pub use onnx::OnnxModel;

use crate::config::ArtifactsConfig;
use crate::error::ScoringResult;
use ndarray::Array2;
use tracing::info;

/// Column-wise numeric transform over a fixed, named column subset.
pub trait Scaler {
    /// Columns the scaler was fitted on, in input order.
    fn columns(&self) -> &[String];
    fn transform(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>>;
}

/// One-hot encoder for a single categorical column.
pub trait CategoricalEncoder {
    fn column(&self) -> &str;
    /// Known categories, in one-hot column order.
    fn categories(&self) -> &[String];
    /// Output column names, `<column>_<category>`.
    fn feature_names(&self) -> Vec<String> {
        self.categories()
            .iter()
            .map(|c| format!("{}_{}", self.column(), c))
            .collect()
    }
    /// Missing values encode as an all-zero row; unseen values are an error.
    fn transform(&self, values: &[Option<&str>]) -> ScoringResult<Array2<f64>>;
}

/// Maps scaled features to their latent embedding.
pub trait RepresentationEncoder {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>>;
}

/// Reconstructs scaled features; same shape in and out.
pub trait ReconstructionModel {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>>;
}

/// Assigns embeddings to behavioral clusters.
pub trait Clusterer {
    /// One centroid per row; row index is the cluster id.
    fn centroids(&self) -> &Array2<f64>;
    fn predict(&self, embedding: &Array2<f64>) -> ScoringResult<Vec<usize>>;
    fn n_clusters(&self) -> usize {
        self.centroids().nrows()
    }
}

/// Supervised fraud classifier.
pub trait Classifier {
    /// Probability of fraud per row.
    fn predict_probability(&self, input: &Array2<f64>) -> ScoringResult<Vec<f64>>;
}

/// Every collaborator a full scoring run needs.
pub struct ModelSet {
    pub scaler: Box<dyn Scaler>,
    pub type_encoder: Box<dyn CategoricalEncoder>,
    pub weekday_encoder: Box<dyn CategoricalEncoder>,
    pub time_bucket_encoder: Box<dyn CategoricalEncoder>,
    pub representation_encoder: Box<dyn RepresentationEncoder>,
    pub autoencoder: Box<dyn ReconstructionModel>,
    pub clusterer: Box<dyn Clusterer>,
    pub classifier: Box<dyn Classifier>,
}

impl ModelSet {
    /// Load every artifact; any failure aborts.
    pub fn load(config: &ArtifactsConfig) -> ScoringResult<Self> {
        let scaler = ColumnScaler::from_file(&config.path(&config.scaler))?;
        let type_encoder = OneHotEncoder::from_file(&config.path(&config.type_encoder))?;
        let weekday_encoder = OneHotEncoder::from_file(&config.path(&config.weekday_encoder))?;
        let time_bucket_encoder =
            OneHotEncoder::from_file(&config.path(&config.time_bucket_encoder))?;
        let clusterer = KMeansClusterer::from_file(&config.path(&config.clusterer))?;
        let representation_encoder = OnnxModel::load(
            &config.path(&config.representation_encoder),
            "representation_encoder",
        )?;
        let autoencoder = OnnxModel::load(&config.path(&config.autoencoder), "autoencoder")?;
        let classifier =
            OnnxModel::load_probability_model(&config.path(&config.classifier), "classifier")?;

        info!(
            dir = %config.dir.display(),
            scaled_columns = scaler.columns().len(),
            clusters = clusterer.n_clusters(),
            "model artifacts loaded"
        );

        Ok(Self {
            scaler: Box::new(scaler),
            type_encoder: Box::new(type_encoder),
            weekday_encoder: Box::new(weekday_encoder),
            time_bucket_encoder: Box::new(time_bucket_encoder),
            representation_encoder: Box::new(representation_encoder),
            autoencoder: Box::new(autoencoder),
            clusterer: Box::new(clusterer),
            classifier: Box::new(classifier),
        })
    }
}
