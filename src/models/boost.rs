//! Softmax gradient boosting (GB-analog)
//!
//! One Newton regression tree per class per round on raw (imputed) features.
//! Labels arrive in GB space (-1/0/1). When an eval set is supplied, boosting
//! stops after `early_stopping_rounds` rounds without an improvement in eval
//! log-loss and the model is truncated to the best round.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use super::tree::{grow_gradient, GradientParams, Node, TreeParams};
use super::{validate_fit_inputs, validate_predict_inputs, DirectionClassifier, EvalSet, InputSpace, ModelKind};
use crate::config::BoostParams;
use crate::error::{EnsembleError, Result};
use crate::labels::LabelSpace;
use crate::types::{ClassProbabilities, N_CLASSES};

const MIN_HESSIAN: f64 = 1e-6;
const PROB_EPS: f64 = 1e-15;

/// Gradient-boosted trees over the three directional classes
pub struct BoostClassifier {
    params: BoostParams,
    min_valid_labels: usize,
    seed: u64,
    base_score: [f64; N_CLASSES],
    /// One tree per class for every kept round
    rounds: Vec<Vec<Node<f64>>>,
    n_features: usize,
    best_iteration: Option<usize>,
    eval_history: Vec<f64>,
}

impl BoostClassifier {
    pub fn new(params: BoostParams, min_valid_labels: usize, seed: u64) -> Self {
        Self {
            params,
            min_valid_labels,
            seed,
            base_score: [0.0; N_CLASSES],
            rounds: Vec::new(),
            n_features: 0,
            best_iteration: None,
            eval_history: Vec::new(),
        }
    }

    pub fn params(&self) -> &BoostParams {
        &self.params
    }

    /// Rounds kept after early stopping
    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Zero-based round with the lowest eval loss, when an eval set was given
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Eval log-loss after each trained round
    pub fn eval_history(&self) -> &[f64] {
        &self.eval_history
    }

    fn gradient_params(&self) -> GradientParams {
        GradientParams {
            tree: TreeParams {
                max_depth: self.params.max_depth.max(1),
                min_samples_split: 2,
                min_samples_leaf: self.params.min_samples_leaf.max(1),
                max_features: None,
            },
            lambda: self.params.lambda.max(0.0),
            min_child_weight: self.params.min_child_weight.max(0.0),
            shrinkage: self.params.learning_rate,
        }
    }

    fn raw_scores(&self, row: &[f64]) -> [f64; N_CLASSES] {
        let mut scores = self.base_score;
        for round in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += tree.leaf(row);
            }
        }
        scores
    }
}

impl DirectionClassifier for BoostClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Boost
    }

    fn label_space(&self) -> LabelSpace {
        LabelSpace::Gb
    }

    fn input_space(&self) -> InputSpace {
        InputSpace::Raw
    }

    fn min_valid_labels(&self) -> usize {
        self.min_valid_labels
    }

    fn fit(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        sample_weight: Option<&[f64]>,
        eval_set: Option<EvalSet<'_>>,
    ) -> Result<()> {
        self.rounds.clear();
        self.n_features = 0;
        self.best_iteration = None;
        self.eval_history.clear();

        let n_features = validate_fit_inputs(ModelKind::Boost, x, y, sample_weight)?;
        let classes = decode_classes(y)?;
        let weights = match sample_weight {
            Some(w) => w.to_vec(),
            None => vec![1.0; x.len()],
        };
        if self.params.learning_rate <= 0.0 || !self.params.learning_rate.is_finite() {
            return Err(EnsembleError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.params.learning_rate
            )));
        }

        let mut counts = [0.0; N_CLASSES];
        for (&c, &w) in classes.iter().zip(&weights) {
            counts[c] += w;
        }
        if counts.iter().filter(|&&c| c > 0.0).count() < 2 {
            return Err(EnsembleError::model_failure(
                ModelKind::Boost.name(),
                "training labels contain fewer than two classes",
            ));
        }
        self.base_score = log_prior(&counts);

        // Eval rows without a usable label are ignored
        let eval: Option<(Vec<&Vec<f64>>, Vec<usize>)> = match eval_set {
            Some(set) => {
                if set.features.len() != set.labels.len() {
                    return Err(EnsembleError::DimensionMismatch {
                        expected: set.features.len(),
                        actual: set.labels.len(),
                    });
                }
                validate_predict_inputs(ModelKind::Boost, set.features, n_features)?;
                let (rows, labels): (Vec<&Vec<f64>>, Vec<usize>) = set
                    .features
                    .iter()
                    .zip(set.labels)
                    .filter_map(|(row, &code)| LabelSpace::Gb.decode(code).map(|d| (row, d.index())))
                    .unzip();
                if rows.is_empty() {
                    None
                } else {
                    Some((rows, labels))
                }
            }
            None => None,
        };

        let n = x.len();
        let params = self.gradient_params();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut train_scores = vec![self.base_score; n];
        let mut eval_scores = eval.as_ref().map(|(rows, _)| vec![self.base_score; rows.len()]);
        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.params.n_rounds {
            let rows = sample_indices(n, self.params.subsample, &mut rng);
            let mut features = sample_indices(n_features, self.params.colsample, &mut rng);
            features.sort_unstable();

            let mut grad = vec![[0.0; N_CLASSES]; n];
            let mut hess = vec![[0.0; N_CLASSES]; n];
            for i in 0..n {
                let p = softmax(&train_scores[i]);
                for k in 0..N_CLASSES {
                    let target = if classes[i] == k { 1.0 } else { 0.0 };
                    grad[i][k] = (p[k] - target) * weights[i];
                    hess[i][k] = (p[k] * (1.0 - p[k])).max(MIN_HESSIAN) * weights[i];
                }
            }

            let trees: Vec<Node<f64>> = (0..N_CLASSES)
                .into_par_iter()
                .map(|k| {
                    let g: Vec<f64> = grad.iter().map(|row| row[k]).collect();
                    let h: Vec<f64> = hess.iter().map(|row| row[k]).collect();
                    grow_gradient(x, &g, &h, rows.clone(), &features, &params)
                })
                .collect();

            for (scores, row) in train_scores.iter_mut().zip(x) {
                for (score, tree) in scores.iter_mut().zip(&trees) {
                    *score += tree.leaf(row);
                }
            }

            if let (Some((eval_rows, eval_labels)), Some(scores)) = (eval.as_ref(), eval_scores.as_mut()) {
                for (s, row) in scores.iter_mut().zip(eval_rows) {
                    for (score, tree) in s.iter_mut().zip(&trees) {
                        *score += tree.leaf(row);
                    }
                }
                let loss = log_loss(scores, eval_labels);
                self.eval_history.push(loss);
                self.rounds.push(trees);

                match best {
                    Some((_, best_loss)) if loss >= best_loss => {}
                    _ => best = Some((round, loss)),
                }
                if let Some((best_round, _)) = best {
                    if round - best_round >= self.params.early_stopping_rounds.max(1) {
                        tracing::debug!(
                            "Boosting stopped early at round {} (best {}, eval loss {:.4})",
                            round,
                            best_round,
                            self.eval_history[best_round]
                        );
                        break;
                    }
                }
            } else {
                self.rounds.push(trees);
            }
        }

        if let Some((best_round, _)) = best {
            self.rounds.truncate(best_round + 1);
            self.best_iteration = Some(best_round);
        }
        self.n_features = n_features;

        tracing::debug!("Boosting fitted: {} rounds on {} rows", self.rounds.len(), n);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<ClassProbabilities>> {
        validate_predict_inputs(ModelKind::Boost, x, self.n_features)?;
        Ok(x.par_iter().map(|row| softmax(&self.raw_scores(row))).collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features > 0
    }
}

fn decode_classes(y: &[f64]) -> Result<Vec<usize>> {
    y.iter()
        .map(|&code| {
            LabelSpace::Gb
                .decode(code)
                .map(|d| d.index())
                .ok_or_else(|| EnsembleError::InvalidLabel(format!("{} is not a GB-space label", code)))
        })
        .collect()
}

/// Centered log of smoothed class frequencies
fn log_prior(counts: &[f64; N_CLASSES]) -> [f64; N_CLASSES] {
    let total: f64 = counts.iter().sum();
    let logs = counts.map(|c| ((c + 1.0) / (total + N_CLASSES as f64)).ln());
    let mean = logs.iter().sum::<f64>() / N_CLASSES as f64;
    logs.map(|l| l - mean)
}

fn softmax(scores: &[f64; N_CLASSES]) -> ClassProbabilities {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = scores.map(|s| (s - max).exp());
    let sum: f64 = exps.iter().sum();
    exps.map(|e| e / sum)
}

fn log_loss(scores: &[[f64; N_CLASSES]], labels: &[usize]) -> f64 {
    let total: f64 = scores
        .iter()
        .zip(labels)
        .map(|(s, &k)| -softmax(s)[k].max(PROB_EPS).ln())
        .sum();
    total / labels.len().max(1) as f64
}

/// Random subset of `0..n` of size `ceil(n * fraction)`, at least one
fn sample_indices(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if fraction < 1.0 {
        indices.shuffle(rng);
        let keep = ((n as f64 * fraction.max(0.0)).ceil() as usize).clamp(1, n);
        indices.truncate(keep);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{argmax_direction, Direction};

    fn small_params() -> BoostParams {
        BoostParams {
            n_rounds: 40,
            learning_rate: 0.3,
            max_depth: 3,
            subsample: 1.0,
            colsample: 1.0,
            early_stopping_rounds: 5,
            ..BoostParams::default()
        }
    }

    /// GB-space clusters along the first feature
    fn clusters() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let jitter = (i % 6) as f64 * 0.1;
            x.push(vec![-10.0 + jitter, 1.0]);
            y.push(-1.0);
            x.push(vec![0.0 + jitter, 1.0]);
            y.push(0.0);
            x.push(vec![10.0 + jitter, 1.0]);
            y.push(1.0);
        }
        (x, y)
    }

    #[test]
    fn test_boosting_learns_clusters() {
        let (x, y) = clusters();
        let mut model = BoostClassifier::new(small_params(), 50, 42);
        model.fit(&x, &y, None, None).unwrap();

        assert!(model.is_fitted());
        assert_eq!(model.n_rounds(), 40);
        assert_eq!(model.best_iteration(), None);

        let probs = model.predict_proba(&[vec![-10.0, 1.0], vec![0.2, 1.0], vec![10.3, 1.0]]).unwrap();
        assert_eq!(argmax_direction(&probs[0]), Direction::Bearish);
        assert_eq!(argmax_direction(&probs[1]), Direction::Neutral);
        assert_eq!(argmax_direction(&probs[2]), Direction::Bullish);
        assert!(probs[2][2] > 0.9);

        assert_eq!(model.predict(&[vec![-9.8, 1.0]]).unwrap(), vec![-1.0]);
    }

    #[test]
    fn test_early_stopping_truncates_to_best_round() {
        let (x, y) = clusters();
        // Eval labels contradict the training signal, so eval loss only grows
        let eval_x = vec![vec![-10.0, 1.0], vec![10.0, 1.0]];
        let eval_y = vec![1.0, -1.0];

        let mut model = BoostClassifier::new(small_params(), 50, 42);
        model
            .fit(
                &x,
                &y,
                None,
                Some(EvalSet {
                    features: &eval_x,
                    labels: &eval_y,
                }),
            )
            .unwrap();

        let best = model.best_iteration().unwrap();
        assert_eq!(best, 0);
        assert_eq!(model.n_rounds(), 1);
        assert_eq!(model.eval_history().len(), 6);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = clusters();
        let params = BoostParams {
            subsample: 0.7,
            colsample: 0.5,
            ..small_params()
        };
        let mut a = BoostClassifier::new(params.clone(), 50, 9);
        let mut b = BoostClassifier::new(params, 50, 9);
        a.fit(&x, &y, None, None).unwrap();
        b.fit(&x, &y, None, None).unwrap();
        let q = vec![vec![3.0, 1.0]];
        assert_eq!(a.predict_proba(&q).unwrap(), b.predict_proba(&q).unwrap());
    }

    #[test]
    fn test_single_class_fails() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut model = BoostClassifier::new(small_params(), 50, 1);
        assert!(matches!(
            model.fit(&x, &[0.0, 0.0, 0.0], None, None),
            Err(EnsembleError::ModelFailure { .. })
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_nan_label_rejected() {
        let x = vec![vec![1.0], vec![2.0]];
        let mut model = BoostClassifier::new(small_params(), 50, 1);
        assert!(matches!(
            model.fit(&x, &[f64::NAN, 1.0], None, None),
            Err(EnsembleError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_softmax_and_prior() {
        let p = softmax(&[0.0, 0.0, 0.0]);
        assert!(p.iter().all(|v| (v - 1.0 / 3.0).abs() < 1e-12));

        let prior = softmax(&log_prior(&[1.0, 8.0, 1.0]));
        assert!(prior[1] > prior[0] && (prior[0] - prior[2]).abs() < 1e-12);
        assert!((prior.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
