//! fraudscore: behavioral profiling and anomaly-fusion fraud scoring for transaction batches.
//!
//! Modular structure:
//! - [`records`]: transaction vocabulary, column names and CSV tables
//! - [`features`]: feature derivation and per-account baselines
//! - [`model`]: pre-fitted model capabilities (ONNX and JSON artifacts)
//! - [`anomaly`]: reconstruction error, latent distance and adaptive cluster thresholds
//! - [`rules`]: heuristic predicates
//! - [`labels`]: synthetic evaluation labels
//! - [`risk`]: fusion of all signals into decision, score, band and rationale
//! - [`stages`]: behavior inference and anomaly inference batch runs
//! - [`logging`]: structured logging

pub mod anomaly;
pub mod config;
pub mod error;
pub mod features;
pub mod labels;
pub mod logging;
pub mod model;
pub mod records;
pub mod risk;
pub mod rules;
pub mod stages;

pub use config::ScoringConfig;
pub use error::{ScoringError, ScoringResult};
pub use logging::StructuredLogger;
pub use model::ModelSet;
pub use stages::{BehaviorStage, DetectionStage, StageSummary};
