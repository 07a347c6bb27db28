//! Deterministic heuristic predicates over a chronologically sorted batch.

mod engine;

pub use engine::{
    chronological_order, cluster_deviation, direct_alert, high_frequency, high_value,
    suspicious_hour, time_since_previous, RuleEngine, RuleEvaluation, RuleFlags,
};
