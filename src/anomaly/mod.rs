//! Representation-space anomaly detection: reconstruction error, latent distance to the
//! nearest cluster, and batch-relative severity.

mod engine;

pub use engine::{
    cluster_suspicion, global_suspicion, nearest_centroid_distances, quantile,
    reconstruction_errors, AnomalyAssessment, AnomalyEngine, AnomalySignals, ClusterThresholds,
    GlobalThresholds,
};
