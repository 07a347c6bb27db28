mod engine;

pub use engine::{
    normalize_scores, FusionEngine, FusionInput, Rationale, Reason, RiskBand, Verdict,
};
