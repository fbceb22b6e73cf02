//! Error types for the ensemble

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Errors raised while training or querying the ensemble
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ensemble is not trained")]
    NotTrained,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Model {model} failed: {reason}")]
    ModelFailure { model: String, reason: String },

    #[error("All sub-models failed: {0}")]
    AllModelsFailed(String),

    #[error("Weight store error: {0}")]
    WeightStore(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnsembleError {
    pub fn model_failure(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelFailure {
            model: model.into(),
            reason: reason.into(),
        }
    }
}
