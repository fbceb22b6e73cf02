//! Purged walk-forward validation
//!
//! Folds use an expanding training window anchored at sample 0. A purge gap of
//! `G` rows separates each training window from its validation window so a
//! label computed up to `G` steps ahead never overlaps validation:
//!
//! ```text
//! fold 0: [train...........)  gap  [val....)
//! fold 1: [train.........................)  gap  [val....)
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::WalkForwardConfig;
use crate::error::{EnsembleError, Result};

/// One (train, validation) pair over ordered sample indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    /// Always starts at 0
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

impl Fold {
    pub fn train_indices(&self) -> Vec<usize> {
        self.train.clone().collect()
    }

    pub fn validation_indices(&self) -> Vec<usize> {
        self.validation.clone().collect()
    }

    /// Rows excluded between the two windows
    pub fn gap(&self) -> usize {
        self.validation.start - self.train.end
    }
}

/// Expanding-window splitter with purge gap
#[derive(Debug, Clone)]
pub struct WalkForwardSplitter {
    pub n_folds: usize,
    pub purge_gap: usize,
    pub min_train_size: usize,
    pub min_val_size: usize,
}

impl WalkForwardSplitter {
    pub fn new(n_folds: usize, purge_gap: usize, min_train_size: usize, min_val_size: usize) -> Self {
        Self {
            n_folds,
            purge_gap,
            min_train_size,
            min_val_size,
        }
    }

    pub fn from_config(config: &WalkForwardConfig) -> Self {
        Self::new(
            config.n_folds,
            config.purge_gap,
            config.min_train_size,
            config.min_val_size,
        )
    }

    /// Smallest `n` that yields one complete fold
    pub fn min_samples(&self) -> usize {
        self.min_train_size + self.purge_gap + self.min_val_size
    }

    /// Generate folds over `n` ordered samples
    pub fn split(&self, n: usize) -> Result<Vec<Fold>> {
        if self.n_folds == 0 {
            return Err(EnsembleError::InvalidConfig("n_folds must be > 0".to_string()));
        }
        if self.min_train_size == 0 {
            return Err(EnsembleError::InvalidConfig("min_train_size must be > 0".to_string()));
        }
        if n < self.min_samples() {
            return Err(EnsembleError::InsufficientData {
                required: self.min_samples(),
                actual: n,
            });
        }

        let available = n - self.min_train_size - self.purge_gap;
        let val_size = self.min_val_size.max(available / self.n_folds);
        let stride = val_size + self.purge_gap;

        let mut folds = Vec::with_capacity(self.n_folds);
        for i in 0..self.n_folds {
            let train_end = self.min_train_size + i * stride;
            let val_start = train_end + self.purge_gap;
            if val_start >= n {
                break;
            }
            let val_end = (val_start + val_size).min(n);
            if val_end <= val_start {
                break;
            }
            folds.push(Fold {
                index: i,
                train: 0..train_end,
                validation: val_start..val_end,
            });
        }

        Ok(folds)
    }
}

/// Chronological holdout split point
///
/// Returns the number of leading rows used for training, or `None` when the
/// dataset is below `threshold` and should be trained on in full.
pub fn holdout_split(n: usize, fraction: f64, min_holdout: usize, threshold: usize) -> Option<usize> {
    if n < threshold || n == 0 {
        return None;
    }
    let by_fraction = (n as f64 * fraction).floor() as usize;
    let holdout = by_fraction.max(min_holdout);
    if holdout >= n {
        return None;
    }
    Some(n - holdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_invariant_holds() {
        for gap in [0usize, 1, 5, 12] {
            let splitter = WalkForwardSplitter::new(5, gap, 50, 10);
            for n in [splitter.min_samples(), 120, 301, 1000] {
                let folds = splitter.split(n).unwrap();
                assert!(!folds.is_empty());
                for fold in &folds {
                    let max_train = fold.train.end - 1;
                    let min_val = fold.validation.start;
                    assert!(min_val - max_train > gap, "gap {} n {}", gap, n);
                    assert_eq!(fold.gap(), gap);
                    assert!(fold.validation.end <= n);
                }
            }
        }
    }

    #[test]
    fn test_expanding_window_anchored_at_zero() {
        let splitter = WalkForwardSplitter::new(4, 5, 100, 20);
        let folds = splitter.split(500).unwrap();
        assert_eq!(folds.len(), 4);
        for pair in folds.windows(2) {
            assert_eq!(pair[0].train.start, 0);
            assert!(pair[1].train.end > pair[0].train.end);
            assert!(pair[1].validation.start > pair[0].validation.start);
        }
    }

    #[test]
    fn test_fold_geometry() {
        // val_size = max(20, (300 - 100 - 5) / 5) = 39
        let splitter = WalkForwardSplitter::new(5, 5, 100, 20);
        let folds = splitter.split(300).unwrap();
        assert_eq!(folds[0].train, 0..100);
        assert_eq!(folds[0].validation, 105..144);
        assert_eq!(folds[1].train, 0..144);
        assert_eq!(folds[1].validation, 149..188);
        assert!(folds.iter().all(|f| f.validation.len() <= 39));
    }

    #[test]
    fn test_minimum_validation_size_truncates_folds() {
        // (130 - 100 - 5) / 5 = 5 < 20, so val_size = 20 and only one fold fits
        let splitter = WalkForwardSplitter::new(5, 5, 100, 20);
        let folds = splitter.split(130).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].validation, 105..125);
    }

    #[test]
    fn test_too_small_is_rejected() {
        let splitter = WalkForwardSplitter::new(5, 5, 100, 20);
        assert!(matches!(
            splitter.split(124),
            Err(EnsembleError::InsufficientData { required: 125, actual: 124 })
        ));
    }

    #[test]
    fn test_holdout_split() {
        assert_eq!(holdout_split(300, 0.2, 30, 60), Some(240));
        assert_eq!(holdout_split(100, 0.2, 30, 60), Some(70));
        assert_eq!(holdout_split(60, 0.2, 30, 60), Some(30));
        assert_eq!(holdout_split(59, 0.2, 30, 60), None);
        assert_eq!(holdout_split(40, 0.2, 30, 10), Some(10));
    }
}
