//! Weighted probability blending

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EnsembleError, Result};
use crate::types::{argmax_direction, ClassProbabilities, Direction, N_CLASSES};
use crate::weights::ModelWeights;

/// One sub-model's own view of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubModelPrediction {
    pub label: Direction,
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
}

/// Ensemble output for a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Direction,
    /// Probability mass on `label`
    pub confidence: f64,
    /// Ordered as [bearish, neutral, bullish], sums to 1
    pub probabilities: ClassProbabilities,
    /// Trained sub-models only
    pub model_predictions: BTreeMap<String, SubModelPrediction>,
    /// 1.0 when every trained sub-model picks the same label
    pub agreement: f64,
}

/// Tabular form of a batch prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    /// Sub-model labels in their native encodings, `None` when untrained
    pub model_labels: BTreeMap<String, Option<f64>>,
    pub ensemble_label: Direction,
    pub ensemble_confidence: f64,
    pub agreement: f64,
}

/// Blend sub-model probabilities into one prediction
///
/// Models given as `None` contribute a zero vector. The blended vector is
/// renormalized, and the label is its argmax with ties going to the later
/// class (bearish < neutral < bullish).
pub fn combine(per_model: &[(&str, Option<ClassProbabilities>)], weights: &ModelWeights) -> Result<PredictionResult> {
    let mut blended = [0.0; N_CLASSES];
    let mut model_predictions = BTreeMap::new();

    for (name, probabilities) in per_model {
        let Some(p) = probabilities else {
            continue;
        };
        let w = weights.get(name);
        for (acc, v) in blended.iter_mut().zip(p) {
            *acc += w * v;
        }
        let label = argmax_direction(p);
        model_predictions.insert(
            name.to_string(),
            SubModelPrediction {
                label,
                confidence: p[label.index()],
                probabilities: *p,
            },
        );
    }

    let total: f64 = blended.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(EnsembleError::AllModelsFailed(
            "no trained sub-model carries blend weight".to_string(),
        ));
    }
    let probabilities = blended.map(|v| v / total);
    let label = argmax_direction(&probabilities);

    let labels: Vec<Direction> = model_predictions.values().map(|p| p.label).collect();
    Ok(PredictionResult {
        label,
        confidence: probabilities[label.index()],
        probabilities,
        model_predictions,
        agreement: agreement_score(&labels),
    })
}

/// `1 - (unique - 1) / (n - 1)`, 1.0 for zero or one model
pub fn agreement_score(labels: &[Direction]) -> f64 {
    if labels.len() <= 1 {
        return 1.0;
    }
    let unique: BTreeSet<Direction> = labels.iter().copied().collect();
    1.0 - (unique.len() - 1) as f64 / (labels.len() - 1) as f64
}
