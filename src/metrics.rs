//! Classification metrics
//!
//! Macro-F1 and balanced accuracy weight every class equally, which is what
//! matters when one class dominates the label distribution.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, N_CLASSES};

/// Confusion matrix indexed as [truth][prediction]
pub type ConfusionMatrix = [[usize; N_CLASSES]; N_CLASSES];

/// Metric bundle for one evaluated partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub balanced_accuracy: f64,
    pub support: usize,
}

impl ClassificationMetrics {
    /// `None` when there is nothing to score
    pub fn evaluate(truth: &[Direction], predicted: &[Direction]) -> Option<Self> {
        if truth.is_empty() || truth.len() != predicted.len() {
            return None;
        }
        let matrix = confusion_matrix(truth, predicted);
        Some(Self {
            accuracy: accuracy_from(&matrix),
            macro_f1: macro_f1_from(&matrix),
            balanced_accuracy: balanced_accuracy_from(&matrix),
            support: truth.len(),
        })
    }
}

pub fn confusion_matrix(truth: &[Direction], predicted: &[Direction]) -> ConfusionMatrix {
    let mut matrix = [[0usize; N_CLASSES]; N_CLASSES];
    for (t, p) in truth.iter().zip(predicted) {
        matrix[t.index()][p.index()] += 1;
    }
    matrix
}

pub fn accuracy(truth: &[Direction], predicted: &[Direction]) -> f64 {
    accuracy_from(&confusion_matrix(truth, predicted))
}

pub fn macro_f1(truth: &[Direction], predicted: &[Direction]) -> f64 {
    macro_f1_from(&confusion_matrix(truth, predicted))
}

pub fn balanced_accuracy(truth: &[Direction], predicted: &[Direction]) -> f64 {
    balanced_accuracy_from(&confusion_matrix(truth, predicted))
}

fn accuracy_from(matrix: &ConfusionMatrix) -> f64 {
    let total: usize = matrix.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let correct: usize = (0..N_CLASSES).map(|c| matrix[c][c]).sum();
    correct as f64 / total as f64
}

/// Mean F1 over classes seen in either truth or prediction
fn macro_f1_from(matrix: &ConfusionMatrix) -> f64 {
    let mut sum = 0.0;
    let mut classes = 0usize;

    for c in 0..N_CLASSES {
        let tp = matrix[c][c] as f64;
        let actual: usize = matrix[c].iter().sum();
        let predicted: usize = (0..N_CLASSES).map(|t| matrix[t][c]).sum();
        if actual == 0 && predicted == 0 {
            continue;
        }
        classes += 1;
        let denom = (actual + predicted) as f64;
        if denom > 0.0 {
            sum += 2.0 * tp / denom;
        }
    }

    if classes == 0 {
        0.0
    } else {
        sum / classes as f64
    }
}

/// Mean recall over classes present in truth
fn balanced_accuracy_from(matrix: &ConfusionMatrix) -> f64 {
    let recalls: Vec<f64> = (0..N_CLASSES)
        .filter_map(|c| {
            let actual: usize = matrix[c].iter().sum();
            (actual > 0).then(|| matrix[c][c] as f64 / actual as f64)
        })
        .collect();

    if recalls.is_empty() {
        0.0
    } else {
        recalls.iter().sum::<f64>() / recalls.len() as f64
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    #[test]
    fn test_perfect_predictions() {
        let truth = vec![Bearish, Neutral, Bullish, Neutral];
        let m = ClassificationMetrics::evaluate(&truth, &truth).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.macro_f1, 1.0);
        assert_eq!(m.balanced_accuracy, 1.0);
        assert_eq!(m.support, 4);
    }

    #[test]
    fn test_majority_guess_is_penalised() {
        // 8 neutral, 1 bearish, 1 bullish; always predicting neutral
        let mut truth = vec![Neutral; 8];
        truth.push(Bearish);
        truth.push(Bullish);
        let predicted = vec![Neutral; 10];

        assert!((accuracy(&truth, &predicted) - 0.8).abs() < 1e-12);
        assert!((balanced_accuracy(&truth, &predicted) - 1.0 / 3.0).abs() < 1e-12);
        // F1 neutral = 2*8/(8+10) = 0.888..., others 0
        assert!((macro_f1(&truth, &predicted) - (16.0 / 18.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let truth = vec![Bearish, Bearish, Bullish];
        let predicted = vec![Bearish, Bullish, Neutral];
        let m = confusion_matrix(&truth, &predicted);
        assert_eq!(m[0][0], 1);
        assert_eq!(m[0][2], 1);
        assert_eq!(m[2][1], 1);
    }

    #[test]
    fn test_evaluate_rejects_mismatch() {
        assert!(ClassificationMetrics::evaluate(&[Neutral], &[]).is_none());
        assert!(ClassificationMetrics::evaluate(&[], &[]).is_none());
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        assert_eq!(std, 1.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }
}
