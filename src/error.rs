use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Unknown category '{value}' for encoder of column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("No behavioral profile for account '{account}'")]
    MissingProfile { account: String },

    #[error("Model '{model}' failed: {reason}")]
    Model { model: String, reason: String },

    #[error("Model '{model}' shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        model: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoringError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    pub fn model(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::Model {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;
