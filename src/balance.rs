//! Synthetic minority oversampling
//!
//! Interpolates between a minority sample and one of its `k` nearest
//! same-class neighbours until every class matches the majority count. Only
//! ever applied to a training partition. When a class has fewer than two
//! samples, oversampling is skipped and callers fall back to inverse-frequency
//! sample weights (`class_weights`).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, Result};
use crate::types::{Direction, FeatureMatrix, N_CLASSES};

/// What the balancer did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BalanceStrategy {
    Oversampled { k: usize },
    Skipped(String),
}

impl BalanceStrategy {
    pub fn is_oversampled(&self) -> bool {
        matches!(self, BalanceStrategy::Oversampled { .. })
    }
}

/// Balanced training rows
///
/// The original rows come first, in their original order, followed by
/// `synthetic` generated rows.
#[derive(Debug, Clone)]
pub struct BalanceOutcome {
    pub features: FeatureMatrix,
    pub labels: Vec<Direction>,
    pub synthetic: usize,
    /// `(anchor, neighbor)` original row indices behind each synthetic row
    pub parents: Vec<(usize, usize)>,
    pub strategy: BalanceStrategy,
}

impl BalanceOutcome {
    /// Pass the rows through untouched
    pub fn unchanged(x: &[Vec<f64>], y: &[Direction], reason: String) -> Self {
        Self {
            features: x.to_vec(),
            labels: y.to_vec(),
            synthetic: 0,
            parents: Vec::new(),
            strategy: BalanceStrategy::Skipped(reason),
        }
    }

    pub fn original_len(&self) -> usize {
        self.labels.len() - self.synthetic
    }
}

/// SMOTE-style oversampler with an explicit seed
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    k_neighbors: usize,
    seed: u64,
}

impl ClassBalancer {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            seed,
        }
    }

    /// Oversample every non-majority class up to the majority count
    pub fn balance(&self, x: &[Vec<f64>], y: &[Direction]) -> Result<BalanceOutcome> {
        if x.len() != y.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }

        let counts = class_counts(y);
        let majority = counts.iter().copied().max().unwrap_or(0);
        let minority = counts.iter().copied().min().unwrap_or(0);

        if minority <= 1 {
            return Ok(BalanceOutcome::unchanged(
                x,
                y,
                format!("minority class has {} sample(s)", minority),
            ));
        }
        if minority == majority {
            return Ok(BalanceOutcome::unchanged(x, y, "classes already balanced".to_string()));
        }

        let k = self.k_neighbors.min(minority - 1);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut features = x.to_vec();
        let mut labels = y.to_vec();
        let mut parents = Vec::new();

        for class in Direction::ALL {
            let needed = majority - counts[class.index()];
            if needed == 0 {
                continue;
            }
            let members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
            let neighbors = nearest_neighbors(x, &members, k);

            for _ in 0..needed {
                let anchor = rng.random_range(0..members.len());
                let neighbor = neighbors[anchor][rng.random_range(0..neighbors[anchor].len())];
                let gap: f64 = rng.random();

                let base = &x[members[anchor]];
                let other = &x[neighbor];
                features.push(base.iter().zip(other).map(|(a, b)| a + gap * (b - a)).collect());
                labels.push(class);
                parents.push((members[anchor], neighbor));
            }
        }

        let synthetic = labels.len() - y.len();
        tracing::debug!(
            "Oversampled {} synthetic rows (k={}, majority={})",
            synthetic,
            k,
            majority
        );

        Ok(BalanceOutcome {
            features,
            labels,
            synthetic,
            parents,
            strategy: BalanceStrategy::Oversampled { k },
        })
    }
}

/// k nearest same-class neighbours (by row index) for each member
fn nearest_neighbors(x: &[Vec<f64>], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .map(|&i| {
            let mut dists: Vec<(f64, usize)> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(&x[i], &x[j]), j))
                .collect();
            dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            dists.truncate(k);
            dists.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Per-class counts ordered as [bearish, neutral, bullish]
pub fn class_counts(y: &[Direction]) -> [usize; N_CLASSES] {
    let mut counts = [0usize; N_CLASSES];
    for label in y {
        counts[label.index()] += 1;
    }
    counts
}

/// Inverse-frequency sample weights, `n / (classes_present * count_c)`
pub fn class_weights(y: &[Direction]) -> Vec<f64> {
    let counts = class_counts(y);
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    let n = y.len() as f64;
    y.iter()
        .map(|label| n / (present as f64 * counts[label.index()] as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    fn skewed(n_neutral: usize, n_bear: usize, n_bull: usize) -> (FeatureMatrix, Vec<Direction>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n_neutral {
            x.push(vec![i as f64 * 0.1, 0.0]);
            y.push(Neutral);
        }
        for i in 0..n_bear {
            x.push(vec![-5.0 - i as f64, -1.0]);
            y.push(Bearish);
        }
        for i in 0..n_bull {
            x.push(vec![5.0 + i as f64, 1.0]);
            y.push(Bullish);
        }
        (x, y)
    }

    #[test]
    fn test_classes_reach_majority_count() {
        let (x, y) = skewed(80, 12, 8);
        let outcome = ClassBalancer::new(5, 7).balance(&x, &y).unwrap();

        assert_eq!(class_counts(&outcome.labels), [80, 80, 80]);
        assert_eq!(outcome.synthetic, 68 + 72);
        assert_eq!(outcome.strategy, BalanceStrategy::Oversampled { k: 5 });
        assert_eq!(outcome.original_len(), 100);
        assert_eq!(&outcome.features[..100], &x[..]);
    }

    #[test]
    fn test_parents_share_the_synthetic_label() {
        let (x, y) = skewed(40, 6, 9);
        let outcome = ClassBalancer::new(3, 5).balance(&x, &y).unwrap();

        assert_eq!(outcome.parents.len(), outcome.synthetic);
        for (&(anchor, neighbor), label) in outcome.parents.iter().zip(&outcome.labels[55..]) {
            assert_ne!(anchor, neighbor);
            assert_eq!(y[anchor], *label);
            assert_eq!(y[neighbor], *label);
        }
    }

    #[test]
    fn test_k_capped_by_minority() {
        let (x, y) = skewed(20, 3, 4);
        let outcome = ClassBalancer::new(5, 1).balance(&x, &y).unwrap();
        assert_eq!(outcome.strategy, BalanceStrategy::Oversampled { k: 2 });
    }

    #[test]
    fn test_synthetic_rows_stay_within_class_region() {
        let (x, y) = skewed(50, 6, 6);
        let outcome = ClassBalancer::new(5, 3).balance(&x, &y).unwrap();

        for (row, label) in outcome.features.iter().zip(&outcome.labels).skip(62) {
            match label {
                Bearish => assert!(row[0] <= -5.0 && row[0] >= -10.0 && row[1] == -1.0),
                Bullish => assert!(row[0] >= 5.0 && row[0] <= 10.0 && row[1] == 1.0),
                Neutral => panic!("majority class must not be oversampled"),
            }
        }
    }

    #[test]
    fn test_single_sample_class_skips() {
        let (x, y) = skewed(30, 1, 5);
        let outcome = ClassBalancer::new(5, 3).balance(&x, &y).unwrap();
        assert_eq!(outcome.synthetic, 0);
        assert!(!outcome.strategy.is_oversampled());
        assert_eq!(outcome.labels, y);
    }

    #[test]
    fn test_missing_class_skips() {
        let (x, y) = skewed(30, 0, 5);
        let outcome = ClassBalancer::new(5, 3).balance(&x, &y).unwrap();
        assert_eq!(outcome.strategy, BalanceStrategy::Skipped("minority class has 0 sample(s)".to_string()));
    }

    #[test]
    fn test_same_seed_same_output() {
        let (x, y) = skewed(40, 5, 7);
        let a = ClassBalancer::new(5, 11).balance(&x, &y).unwrap();
        let b = ClassBalancer::new(5, 11).balance(&x, &y).unwrap();
        assert_eq!(a.features, b.features);
        let c = ClassBalancer::new(5, 12).balance(&x, &y).unwrap();
        assert_ne!(a.features, c.features);
    }

    #[test]
    fn test_class_weights_inverse_frequency() {
        let y = vec![Neutral, Neutral, Neutral, Bullish];
        let w = class_weights(&y);
        // 4 / (2 * 3) and 4 / (2 * 1)
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[3] - 2.0).abs() < 1e-12);
        let total_neutral: f64 = w[..3].iter().sum();
        assert!((total_neutral - w[3]).abs() < 1e-12);
    }
}
