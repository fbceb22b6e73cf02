//! Train-only imputation and robust scaling
//!
//! Statistics come exclusively from the training partition and are applied
//! unchanged to validation/test rows.

use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, Result};
use crate::types::FeatureMatrix;

/// Fitted per-column statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessState {
    /// Fill value for NaN/Inf, median of the finite training values
    pub medians: Vec<f64>,
    /// Median of the imputed training column
    pub centers: Vec<f64>,
    /// Interquartile range of the imputed training column, 1.0 when degenerate
    pub scales: Vec<f64>,
}

/// Median imputer followed by a robust scaler
pub struct Preprocessor;

impl Preprocessor {
    pub fn fit(x_train: &[Vec<f64>]) -> Result<PreprocessState> {
        let n_features = check_rectangular(x_train, None)?;

        let mut medians = Vec::with_capacity(n_features);
        let mut centers = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);

        for col in 0..n_features {
            let mut finite: Vec<f64> = x_train
                .iter()
                .map(|row| row[col])
                .filter(|v| v.is_finite())
                .collect();
            sort_floats(&mut finite);
            let median = if finite.is_empty() { 0.0 } else { quantile(&finite, 0.5) };

            let mut imputed: Vec<f64> = x_train
                .iter()
                .map(|row| if row[col].is_finite() { row[col] } else { median })
                .collect();
            sort_floats(&mut imputed);

            let iqr = quantile(&imputed, 0.75) - quantile(&imputed, 0.25);
            medians.push(median);
            centers.push(quantile(&imputed, 0.5));
            scales.push(if iqr.is_finite() && iqr > f64::EPSILON { iqr } else { 1.0 });
        }

        Ok(PreprocessState {
            medians,
            centers,
            scales,
        })
    }
}

impl PreprocessState {
    pub fn n_features(&self) -> usize {
        self.medians.len()
    }

    /// Replace non-finite values with the training median
    pub fn impute(&self, x: &[Vec<f64>]) -> Result<FeatureMatrix> {
        check_rectangular(x, Some(self.n_features()))?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .zip(&self.medians)
                    .map(|(&v, &m)| if v.is_finite() { v } else { m })
                    .collect()
            })
            .collect())
    }

    /// Impute, then center on the training median and divide by the training IQR
    pub fn transform(&self, x: &[Vec<f64>]) -> Result<FeatureMatrix> {
        let mut out = self.impute(x)?;
        for row in &mut out {
            for (col, v) in row.iter_mut().enumerate() {
                *v = (*v - self.centers[col]) / self.scales[col];
            }
        }
        Ok(out)
    }

    /// Map scaled rows back to (imputed) raw feature space
    pub fn inverse_transform(&self, x: &[Vec<f64>]) -> Result<FeatureMatrix> {
        check_rectangular(x, Some(self.n_features()))?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(col, &v)| v * self.scales[col] + self.centers[col])
                    .collect()
            })
            .collect())
    }
}

/// Validate a non-empty rectangular matrix, returning its width
pub(crate) fn check_rectangular(x: &[Vec<f64>], expected: Option<usize>) -> Result<usize> {
    let width = match (x.first(), expected) {
        (_, Some(w)) => w,
        (Some(row), None) => row.len(),
        (None, None) => {
            return Err(EnsembleError::InsufficientData {
                required: 1,
                actual: 0,
            })
        }
    };
    if width == 0 {
        return Err(EnsembleError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if let Some(row) = x.iter().find(|row| row.len() != width) {
        return Err(EnsembleError::DimensionMismatch {
            expected: width,
            actual: row.len(),
        });
    }
    Ok(width)
}

fn sort_floats(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Linear-interpolated quantile of sorted, non-empty values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    #[test]
    fn test_median_and_iqr() {
        let state = Preprocessor::fit(&column(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        assert_eq!(state.medians, vec![3.0]);
        assert_eq!(state.centers, vec![3.0]);
        // q25 = 2, q75 = 4
        assert_eq!(state.scales, vec![2.0]);

        let out = state.transform(&column(&[3.0, 7.0])).unwrap();
        assert_eq!(out, vec![vec![0.0], vec![2.0]]);
    }

    #[test]
    fn test_non_finite_values_are_imputed() {
        let state = Preprocessor::fit(&column(&[1.0, f64::NAN, 3.0, f64::INFINITY, 5.0])).unwrap();
        assert_eq!(state.medians, vec![3.0]);

        let imputed = state.impute(&column(&[f64::NAN, f64::NEG_INFINITY, 2.0])).unwrap();
        assert_eq!(imputed, vec![vec![3.0], vec![3.0], vec![2.0]]);

        let scaled = state.transform(&column(&[f64::NAN])).unwrap();
        assert_eq!(scaled, vec![vec![0.0]]);
    }

    #[test]
    fn test_all_missing_column_falls_back_to_zero() {
        let x = vec![vec![f64::NAN, 1.0], vec![f64::NAN, 2.0]];
        let state = Preprocessor::fit(&x).unwrap();
        assert_eq!(state.medians[0], 0.0);
        assert_eq!(state.scales[0], 1.0);
    }

    #[test]
    fn test_constant_column_has_unit_scale() {
        let state = Preprocessor::fit(&column(&[4.0, 4.0, 4.0])).unwrap();
        assert_eq!(state.scales, vec![1.0]);
    }

    #[test]
    fn test_validation_rows_use_training_statistics() {
        let train: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i * i) as f64 % 7.0]).collect();
        let mut extended = train.clone();
        extended.extend((0..50).map(|i| vec![1e6 + i as f64, f64::NAN]));

        // Later rows would shift every statistic if they leaked into the fit
        let train_only = Preprocessor::fit(&train).unwrap();
        let full = Preprocessor::fit(&extended).unwrap();
        assert_ne!(train_only.centers[0], full.centers[0]);
        assert_ne!(train_only.scales[0], full.scales[0]);
        assert_eq!(train_only.centers[0], 24.5);

        let val = train_only.transform(&extended[train.len()..]).unwrap();
        assert_eq!(val[0][0], (1e6 - train_only.centers[0]) / train_only.scales[0]);
        assert_eq!(val[0][1], (train_only.medians[1] - train_only.centers[1]) / train_only.scales[1]);
    }

    #[test]
    fn test_inverse_transform_round_trip() {
        let x = vec![vec![1.0, 10.0], vec![2.0, 30.0], vec![5.0, 20.0]];
        let state = Preprocessor::fit(&x).unwrap();
        let back = state.inverse_transform(&state.transform(&x).unwrap()).unwrap();
        for (row, orig) in back.iter().zip(&x) {
            for (a, b) in row.iter().zip(orig) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_dimension_checks() {
        let state = Preprocessor::fit(&column(&[1.0, 2.0])).unwrap();
        assert!(matches!(
            state.transform(&[vec![1.0, 2.0]]),
            Err(EnsembleError::DimensionMismatch { expected: 1, actual: 2 })
        ));
        assert!(Preprocessor::fit(&[]).is_err());
        assert!(Preprocessor::fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
