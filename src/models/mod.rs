//! Trainable sub-models
//!
//! Every classifier sits behind `DirectionClassifier`, so the orchestrator
//! never branches on a concrete type. `build_classifiers` instantiates only the
//! models enabled in configuration.

pub mod boost;
pub mod forest;
pub mod tree;

pub use boost::BoostClassifier;
pub use forest::ForestClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::error::{EnsembleError, Result};
use crate::labels::LabelSpace;
use crate::types::{argmax_direction, ClassProbabilities};

/// Sub-model identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Forest,
    Boost,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Forest, ModelKind::Boost];

    /// Key used in weight maps and stats
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Forest => "rf",
            ModelKind::Boost => "gb",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feature space a model is trained and queried in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSpace {
    /// Imputed and robust-scaled
    Scaled,
    /// Imputed only
    Raw,
}

/// Validation rows, in the model's input and label spaces
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub features: &'a [Vec<f64>],
    pub labels: &'a [f64],
}

/// Result of attempting to fit one sub-model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FitOutcome {
    Trained,
    /// Precondition not met, fit never attempted
    Skipped(String),
    /// Fit attempted and returned an error
    Failed(String),
}

impl FitOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, FitOutcome::Trained)
    }
}

/// Uniform train/predict contract
pub trait DirectionClassifier: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn label_space(&self) -> LabelSpace;

    fn input_space(&self) -> InputSpace;

    /// Rows with a valid label needed before a fit is attempted
    fn min_valid_labels(&self) -> usize;

    /// Fit on encoded labels; discards any previous fit
    fn fit(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        sample_weight: Option<&[f64]>,
        eval_set: Option<EvalSet<'_>>,
    ) -> Result<()>;

    /// Probabilities ordered as [bearish, neutral, bullish]
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<ClassProbabilities>>;

    /// Labels in this model's native encoding
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let space = self.label_space();
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|p| space.encode_direction(argmax_direction(p)))
            .collect())
    }

    fn is_fitted(&self) -> bool;

    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Instantiate the enabled sub-models in a fixed order
pub fn build_classifiers(config: &Config, seed: u64) -> Vec<Box<dyn DirectionClassifier>> {
    let mut models: Vec<Box<dyn DirectionClassifier>> = Vec::new();
    if config.forest.enabled {
        models.push(Box::new(ForestClassifier::new(config.forest.clone(), seed)));
    }
    if config.boost.enabled {
        let params = config.boost.params(config.walk_forward.enabled).clone();
        models.push(Box::new(BoostClassifier::new(
            params,
            config.boost.min_valid_labels,
            seed.wrapping_add(1),
        )));
    }
    models
}

/// Shared input checks for `fit`; returns the feature count
pub(crate) fn validate_fit_inputs(
    kind: ModelKind,
    x: &[Vec<f64>],
    y: &[f64],
    sample_weight: Option<&[f64]>,
) -> Result<usize> {
    if x.is_empty() {
        return Err(EnsembleError::model_failure(kind.name(), "no training rows"));
    }
    if x.len() != y.len() {
        return Err(EnsembleError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    if let Some(w) = sample_weight {
        if w.len() != x.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.len(),
                actual: w.len(),
            });
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EnsembleError::model_failure(kind.name(), "sample weights must be finite and non-negative"));
        }
    }
    let width = x[0].len();
    if width == 0 {
        return Err(EnsembleError::model_failure(kind.name(), "no feature columns"));
    }
    for row in x {
        if row.len() != width {
            return Err(EnsembleError::DimensionMismatch {
                expected: width,
                actual: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EnsembleError::model_failure(kind.name(), "non-finite feature value"));
        }
    }
    Ok(width)
}

/// Shared input checks for prediction
pub(crate) fn validate_predict_inputs(kind: ModelKind, x: &[Vec<f64>], n_features: usize) -> Result<()> {
    if n_features == 0 {
        return Err(EnsembleError::model_failure(kind.name(), "model is not fitted"));
    }
    for row in x {
        if row.len() != n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
    }
    Ok(())
}
