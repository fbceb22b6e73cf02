//! Training orchestrator
//!
//! `DirectionalEnsemble` drives one training run:
//! 1. walk-forward diagnostics (parallel folds, fresh models per fold)
//! 2. chronological holdout split, or full-data training for tiny datasets
//! 3. train-only preprocessing and oversampling
//! 4. per-model fit with failures isolated and weights redistributed
//! 5. holdout metrics

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::combiner::{combine, BatchRow, PredictionResult};
use crate::balance::{class_counts, class_weights, BalanceOutcome, BalanceStrategy, ClassBalancer};
use crate::config::Config;
use crate::error::{EnsembleError, Result};
use crate::metrics::{mean_std, ClassificationMetrics};
use crate::models::{build_classifiers, DirectionClassifier, EvalSet, FitOutcome, InputSpace, ModelKind};
use crate::preprocess::{check_rectangular, PreprocessState, Preprocessor};
use crate::types::{argmax_direction, ClassProbabilities, Direction, FeatureMatrix, RawLabel, N_CLASSES};
use crate::validation::{holdout_split, Fold, WalkForwardSplitter};
use crate::weights::{ModelWeights, StoreWeightProvider, WeightProvider, WeightStore};

/// Seed offset between walk-forward folds
const FOLD_SEED_STRIDE: u64 = 1000;

/// Lifecycle of an ensemble instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleState {
    Untrained,
    Training,
    Trained,
    TrainingFailed,
}

/// Per-model validation scores for one walk-forward fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub train_size: usize,
    pub val_size: usize,
    /// Trained models only
    pub models: BTreeMap<String, ClassificationMetrics>,
}

/// Mean/std of a model's fold scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub folds: usize,
    pub macro_f1_mean: f64,
    pub macro_f1_std: f64,
    pub balanced_accuracy_mean: f64,
    pub balanced_accuracy_std: f64,
}

/// Walk-forward diagnostics; never feeds back into the deployed model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub folds: Vec<FoldMetrics>,
    pub models: BTreeMap<String, MetricSummary>,
}

impl WalkForwardSummary {
    fn from_folds(folds: Vec<FoldMetrics>) -> Self {
        let mut scores: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for fold in &folds {
            for (name, m) in &fold.models {
                let entry = scores.entry(name.clone()).or_default();
                entry.0.push(m.macro_f1);
                entry.1.push(m.balanced_accuracy);
            }
        }

        let models = scores
            .into_iter()
            .map(|(name, (f1, bacc))| {
                let (macro_f1_mean, macro_f1_std) = mean_std(&f1);
                let (balanced_accuracy_mean, balanced_accuracy_std) = mean_std(&bacc);
                (
                    name,
                    MetricSummary {
                        folds: f1.len(),
                        macro_f1_mean,
                        macro_f1_std,
                        balanced_accuracy_mean,
                        balanced_accuracy_std,
                    },
                )
            })
            .collect();

        Self { folds, models }
    }
}

/// Diagnostics of a completed training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStats {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
    pub n_features: usize,
    pub n_train: usize,
    pub n_holdout: usize,
    /// Training partition class counts before oversampling
    pub class_counts: [usize; N_CLASSES],
    pub balancing: BalanceStrategy,
    pub n_synthetic: usize,
    pub outcomes: BTreeMap<String, FitOutcome>,
    /// Per trained model plus `"ensemble"`, empty without a holdout
    ///
    /// The boost model early-stops on these same rows, so its entry and the
    /// `"ensemble"` entry carry a selection bias. Forest scores do not.
    pub holdout_metrics: BTreeMap<String, ClassificationMetrics>,
    /// Holdout rows the boost model used for early stopping, 0 when none
    #[serde(default)]
    pub early_stopping_rows: usize,
    pub walk_forward: Option<WalkForwardSummary>,
    /// Blend weights after redistribution
    pub weights: ModelWeights,
}

impl TrainingStats {
    pub fn holdout_accuracy(&self, model: &str) -> Option<f64> {
        self.holdout_metrics.get(model).map(|m| m.accuracy)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Training rows after preprocessing and balancing
struct TrainingSet {
    scaled: FeatureMatrix,
    raw: FeatureMatrix,
    /// `None` for an unrecognized original label
    labels: Vec<Option<Direction>>,
    /// Leading rows that are real observations; the rest are synthetic
    n_original: usize,
    sample_weight: Option<Vec<f64>>,
    balance: BalanceStrategy,
    synthetic: usize,
    class_counts: [usize; N_CLASSES],
}

/// Rows scored after fitting (holdout or fold validation)
struct EvalPartition {
    scaled: FeatureMatrix,
    raw: FeatureMatrix,
    labels: Vec<Option<Direction>>,
}

impl EvalPartition {
    fn features(&self, space: InputSpace) -> &FeatureMatrix {
        match space {
            InputSpace::Scaled => &self.scaled,
            InputSpace::Raw => &self.raw,
        }
    }
}

/// Preprocess `train`, oversample it, and transform `eval` with train statistics
fn prepare_partitions(
    config: &Config,
    x_train: &[Vec<f64>],
    y_train: &[RawLabel],
    x_eval: &[Vec<f64>],
    y_eval: &[RawLabel],
    seed: u64,
) -> Result<(PreprocessState, TrainingSet, EvalPartition)> {
    let state = Preprocessor::fit(x_train)?;
    let scaled = state.transform(x_train)?;

    let known: Vec<Option<Direction>> = y_train.iter().map(RawLabel::direction).collect();
    let directions: Vec<Direction> = known.iter().map(|d| d.unwrap_or(Direction::Neutral)).collect();
    let counts = class_counts(&directions);

    let outcome = if config.balancer.enabled {
        ClassBalancer::new(config.balancer.k_neighbors, seed).balance(&scaled, &directions)?
    } else {
        BalanceOutcome::unchanged(&scaled, &directions, "balancing disabled".to_string())
    };

    let sample_weight = if outcome.strategy.is_oversampled() {
        None
    } else {
        tracing::debug!("Oversampling skipped ({:?}), using class weights", outcome.strategy);
        Some(class_weights(&outcome.labels))
    };

    // Offspring of an unrecognized label stay unrecognized
    let synthetic_labels: Vec<Option<Direction>> = outcome
        .parents
        .iter()
        .zip(&outcome.labels[outcome.original_len()..])
        .map(|(&(anchor, neighbor), &label)| {
            (known[anchor].is_some() && known[neighbor].is_some()).then_some(label)
        })
        .collect();
    let mut labels = known;
    labels.extend(synthetic_labels);
    let raw = state.inverse_transform(&outcome.features)?;

    let eval = EvalPartition {
        scaled: state.transform(x_eval)?,
        raw: state.impute(x_eval)?,
        labels: y_eval.iter().map(RawLabel::direction).collect(),
    };

    let set = TrainingSet {
        n_original: outcome.original_len(),
        scaled: outcome.features,
        raw,
        labels,
        sample_weight,
        balance: outcome.strategy,
        synthetic: outcome.synthetic,
        class_counts: counts,
    };
    Ok((state, set, eval))
}

/// Fit every model on its own view of `set`; failures are isolated
fn fit_models(
    models: &mut [Box<dyn DirectionClassifier>],
    set: &TrainingSet,
    eval: Option<&EvalPartition>,
) -> BTreeMap<String, FitOutcome> {
    let mut outcomes = BTreeMap::new();

    for model in models.iter_mut() {
        let space = model.label_space();
        let features = match model.input_space() {
            InputSpace::Scaled => &set.scaled,
            InputSpace::Raw => &set.raw,
        };

        let encoded: Vec<f64> = set.labels.iter().map(|d| space.encode_known(*d)).collect();
        let keep: Vec<usize> = (0..encoded.len()).filter(|&i| encoded[i].is_finite()).collect();
        // Synthetic rows never make up for scarce real labels
        let valid = keep.iter().filter(|&&i| i < set.n_original).count();

        let outcome = if valid < model.min_valid_labels() {
            let reason = format!("{} rows with a valid label, need {}", valid, model.min_valid_labels());
            tracing::info!("Skipping {}: {}", model.name(), reason);
            FitOutcome::Skipped(reason)
        } else {
            let x: FeatureMatrix = keep.iter().map(|&i| features[i].clone()).collect();
            let y: Vec<f64> = keep.iter().map(|&i| encoded[i]).collect();
            let w: Option<Vec<f64>> = set
                .sample_weight
                .as_ref()
                .map(|w| keep.iter().map(|&i| w[i]).collect());

            let eval_labels: Option<Vec<f64>> =
                eval.map(|e| e.labels.iter().map(|d| space.encode_known(*d)).collect());
            let eval_set = match (eval, eval_labels.as_ref()) {
                (Some(e), Some(labels)) if !labels.is_empty() => Some(EvalSet {
                    features: e.features(model.input_space()),
                    labels,
                }),
                _ => None,
            };

            match model.fit(&x, &y, w.as_deref(), eval_set) {
                Ok(()) => FitOutcome::Trained,
                Err(e) => {
                    tracing::warn!("Model {} failed to train: {}", model.name(), e);
                    FitOutcome::Failed(e.to_string())
                }
            }
        };
        outcomes.insert(model.name().to_string(), outcome);
    }

    outcomes
}

/// Score trained models on rows with a recognized label
fn evaluate_models(
    models: &[Box<dyn DirectionClassifier>],
    outcomes: &BTreeMap<String, FitOutcome>,
    eval: &EvalPartition,
) -> Result<BTreeMap<String, Vec<ClassProbabilities>>> {
    let mut probabilities = BTreeMap::new();
    for model in models {
        if !outcomes.get(model.name()).is_some_and(FitOutcome::is_trained) {
            continue;
        }
        let probs = model.predict_proba(eval.features(model.input_space()))?;
        probabilities.insert(model.name().to_string(), probs);
    }
    Ok(probabilities)
}

fn score(labels: &[Option<Direction>], probs: &[ClassProbabilities]) -> Option<ClassificationMetrics> {
    let (truth, predicted): (Vec<Direction>, Vec<Direction>) = labels
        .iter()
        .zip(probs)
        .filter_map(|(t, p)| t.map(|t| (t, argmax_direction(p))))
        .unzip();
    ClassificationMetrics::evaluate(&truth, &predicted)
}

/// Train fresh models on one fold and score them on its validation window
fn evaluate_fold(config: &Config, x: &[Vec<f64>], labels: &[RawLabel], fold: &Fold) -> Result<FoldMetrics> {
    let seed = config
        .ensemble
        .seed
        .wrapping_add(FOLD_SEED_STRIDE.wrapping_mul(fold.index as u64 + 1));
    let (train, val) = (fold.train.clone(), fold.validation.clone());

    let (_, set, eval) = prepare_partitions(
        config,
        &x[train.clone()],
        &labels[train.clone()],
        &x[val.clone()],
        &labels[val.clone()],
        seed,
    )?;

    let mut models = build_classifiers(config, seed);
    let outcomes = fit_models(&mut models, &set, Some(&eval));
    let probabilities = evaluate_models(&models, &outcomes, &eval)?;

    let models = probabilities
        .iter()
        .filter_map(|(name, probs)| score(&eval.labels, probs).map(|m| (name.clone(), m)))
        .collect();

    Ok(FoldMetrics {
        fold: fold.index,
        train_size: train.len(),
        val_size: val.len(),
        models,
    })
}

/// Two-model directional ensemble
pub struct DirectionalEnsemble {
    config: Config,
    models: Vec<Box<dyn DirectionClassifier>>,
    initial_weights: ModelWeights,
    weights: ModelWeights,
    state: EnsembleState,
    preprocess: Option<PreprocessState>,
    /// False when trained on imputed raw data only
    scaled: bool,
    outcomes: BTreeMap<String, FitOutcome>,
    stats: Option<TrainingStats>,
}

impl DirectionalEnsemble {
    /// Weights from `config.weights.explicit`, equal otherwise
    pub fn new(config: Config) -> Result<Self> {
        let weights = match &config.weights.explicit {
            Some(explicit) => ModelWeights::new(explicit.clone())?,
            None => ModelWeights::default_pair(),
        };
        Ok(Self::with_weights(config, weights))
    }

    /// Weights resolved once from `provider`
    pub fn with_provider(config: Config, provider: &dyn WeightProvider, horizon: &str, symbol: Option<&str>) -> Self {
        let weights = provider.get_weights(horizon, symbol);
        Self::with_weights(config, weights)
    }

    /// Weights resolved from `store` for the configured horizon
    pub fn with_store<S: WeightStore>(config: Config, store: S, symbol: Option<&str>) -> Self {
        let provider = StoreWeightProvider::from_config(store, &config.weights);
        let horizon = config.weights.horizon.clone();
        Self::with_provider(config, &provider, &horizon, symbol)
    }

    pub fn with_weights(config: Config, weights: ModelWeights) -> Self {
        let models = build_classifiers(&config, config.ensemble.seed);
        let weights = align_weights(&models, weights);
        Self {
            config,
            models,
            initial_weights: weights.clone(),
            weights,
            state: EnsembleState::Untrained,
            preprocess: None,
            scaled: false,
            outcomes: BTreeMap::new(),
            stats: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> EnsembleState {
        self.state
    }

    pub fn is_trained(&self) -> bool {
        self.state == EnsembleState::Trained
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    /// Imputation and scaling statistics of the final fit
    pub fn preprocess_state(&self) -> Option<&PreprocessState> {
        self.preprocess.as_ref()
    }

    pub fn training_stats(&self) -> Option<&TrainingStats> {
        self.stats.as_ref()
    }

    pub fn fit_outcomes(&self) -> &BTreeMap<String, FitOutcome> {
        &self.outcomes
    }

    pub fn models(&self) -> &[Box<dyn DirectionClassifier>] {
        &self.models
    }

    /// Train once on the full ordered dataset
    pub fn train(&mut self, x: &[Vec<f64>], labels: &[RawLabel]) -> Result<&TrainingStats> {
        if self.state != EnsembleState::Untrained {
            return Err(EnsembleError::InvalidState(format!(
                "train() called in state {:?}; use refit() to retrain",
                self.state
            )));
        }
        if x.len() != labels.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.len(),
                actual: labels.len(),
            });
        }
        check_rectangular(x, None)?;

        self.state = EnsembleState::Training;
        match self.run_training(x, labels) {
            Ok(stats) => {
                self.state = EnsembleState::Trained;
                Ok(self.stats.insert(stats))
            }
            Err(e) => {
                tracing::error!("Training failed: {}", e);
                self.state = EnsembleState::TrainingFailed;
                Err(e)
            }
        }
    }

    /// Discard all fitted state and train again
    pub fn refit(&mut self, x: &[Vec<f64>], labels: &[RawLabel]) -> Result<&TrainingStats> {
        self.models = build_classifiers(&self.config, self.config.ensemble.seed);
        self.weights = self.initial_weights.clone();
        self.state = EnsembleState::Untrained;
        self.preprocess = None;
        self.scaled = false;
        self.outcomes.clear();
        self.stats = None;
        self.train(x, labels)
    }

    fn run_training(&mut self, x: &[Vec<f64>], labels: &[RawLabel]) -> Result<TrainingStats> {
        let n = x.len();
        if self.models.is_empty() {
            return Err(EnsembleError::AllModelsFailed("no sub-models enabled".to_string()));
        }

        let walk_forward = if self.config.walk_forward.enabled && n >= self.config.walk_forward.min_samples() {
            self.walk_forward(x, labels)
        } else {
            None
        };

        let cfg = &self.config.ensemble;
        let split = holdout_split(n, cfg.holdout_fraction, cfg.min_holdout, cfg.holdout_threshold);

        let (set, eval) = match split {
            Some(split) => {
                tracing::info!("Holdout split: {} train / {} holdout rows", split, n - split);
                let (state, set, eval) = prepare_partitions(
                    &self.config,
                    &x[..split],
                    &labels[..split],
                    &x[split..],
                    &labels[split..],
                    self.config.ensemble.seed,
                )?;
                self.preprocess = Some(state);
                self.scaled = true;
                (set, Some(eval))
            }
            None => {
                tracing::info!(
                    "{} rows below holdout threshold {}: training on all rows without scaling or oversampling",
                    n,
                    cfg.holdout_threshold
                );
                let state = Preprocessor::fit(x)?;
                let imputed = state.impute(x)?;
                let known: Vec<Option<Direction>> = labels.iter().map(RawLabel::direction).collect();
                let directions: Vec<Direction> = known.iter().map(|d| d.unwrap_or(Direction::Neutral)).collect();
                let set = TrainingSet {
                    n_original: imputed.len(),
                    scaled: imputed.clone(),
                    raw: imputed,
                    sample_weight: Some(class_weights(&directions)),
                    class_counts: class_counts(&directions),
                    labels: known,
                    balance: BalanceStrategy::Skipped("dataset below holdout threshold".to_string()),
                    synthetic: 0,
                };
                self.preprocess = Some(state);
                self.scaled = false;
                (set, None)
            }
        };

        let outcomes = fit_models(&mut self.models, &set, eval.as_ref());
        self.outcomes = outcomes.clone();

        if !outcomes.values().any(FitOutcome::is_trained) {
            let reasons: Vec<String> = outcomes
                .iter()
                .map(|(name, outcome)| match outcome {
                    FitOutcome::Skipped(r) => format!("{} skipped: {}", name, r),
                    FitOutcome::Failed(r) => format!("{} failed: {}", name, r),
                    FitOutcome::Trained => format!("{} trained", name),
                })
                .collect();
            return Err(EnsembleError::AllModelsFailed(reasons.join("; ")));
        }

        for (name, outcome) in &outcomes {
            if !outcome.is_trained() && self.weights.contains(name) {
                self.weights.redistribute(name)?;
            }
        }

        let mut holdout_metrics = BTreeMap::new();
        if let Some(eval) = &eval {
            let probabilities = evaluate_models(&self.models, &outcomes, eval)?;
            for (name, probs) in &probabilities {
                if let Some(m) = score(&eval.labels, probs) {
                    tracing::info!(
                        "Holdout {}: accuracy={:.3} macro_f1={:.3} balanced_accuracy={:.3}",
                        name,
                        m.accuracy,
                        m.macro_f1,
                        m.balanced_accuracy
                    );
                    holdout_metrics.insert(name.clone(), m);
                }
            }

            let blended = (0..eval.labels.len())
                .map(|i| {
                    let rows: Vec<(&str, Option<ClassProbabilities>)> = probabilities
                        .iter()
                        .map(|(name, probs)| (name.as_str(), Some(probs[i])))
                        .collect();
                    combine(&rows, &self.weights).map(|r| r.probabilities)
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(m) = score(&eval.labels, &blended) {
                holdout_metrics.insert("ensemble".to_string(), m);
            }
        }

        let boost_trained = outcomes.get(ModelKind::Boost.name()).is_some_and(FitOutcome::is_trained);
        let early_stopping_rows = match &eval {
            Some(eval) if boost_trained => eval.labels.iter().filter(|l| l.is_some()).count(),
            _ => 0,
        };

        let n_train = split.unwrap_or(n);
        Ok(TrainingStats {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            n_samples: n,
            n_features: x.first().map_or(0, Vec::len),
            n_train,
            n_holdout: n - n_train,
            class_counts: set.class_counts,
            balancing: set.balance,
            n_synthetic: set.synthetic,
            outcomes,
            holdout_metrics,
            early_stopping_rows,
            walk_forward,
            weights: self.weights.clone(),
        })
    }

    /// Fold diagnostics; failures are logged and dropped
    fn walk_forward(&self, x: &[Vec<f64>], labels: &[RawLabel]) -> Option<WalkForwardSummary> {
        let splitter = WalkForwardSplitter::from_config(&self.config.walk_forward);
        let folds = match splitter.split(x.len()) {
            Ok(folds) => folds,
            Err(e) => {
                tracing::warn!("Walk-forward skipped: {}", e);
                return None;
            }
        };

        let results: Vec<Result<FoldMetrics>> = folds
            .par_iter()
            .map(|fold| evaluate_fold(&self.config, x, labels, fold))
            .collect();

        let mut metrics = Vec::with_capacity(results.len());
        for (fold, result) in folds.iter().zip(results) {
            match result {
                Ok(m) => {
                    for (name, s) in &m.models {
                        tracing::info!(
                            "Fold {} {}: macro_f1={:.3} balanced_accuracy={:.3}",
                            fold.index,
                            name,
                            s.macro_f1,
                            s.balanced_accuracy
                        );
                    }
                    metrics.push(m);
                }
                Err(e) => tracing::warn!("Fold {} failed: {}", fold.index, e),
            }
        }

        let summary = WalkForwardSummary::from_folds(metrics);
        for (name, s) in &summary.models {
            tracing::info!(
                "Walk-forward {} over {} folds: macro_f1={:.3}±{:.3} balanced_accuracy={:.3}±{:.3}",
                name,
                s.folds,
                s.macro_f1_mean,
                s.macro_f1_std,
                s.balanced_accuracy_mean,
                s.balanced_accuracy_std
            );
        }
        Some(summary)
    }

    /// Per-model probabilities for `x`, `None` for models that did not train
    fn model_probabilities(&self, x: &[Vec<f64>]) -> Result<Vec<(String, Option<Vec<ClassProbabilities>>)>> {
        if self.state != EnsembleState::Trained {
            return Err(EnsembleError::NotTrained);
        }
        let state = self.preprocess.as_ref().ok_or(EnsembleError::NotTrained)?;
        let raw = state.impute(x)?;
        let scaled = if self.scaled { state.transform(x)? } else { raw.clone() };

        self.models
            .iter()
            .map(|model| {
                let trained = self.outcomes.get(model.name()).is_some_and(FitOutcome::is_trained);
                let probs = if trained {
                    let features = match model.input_space() {
                        InputSpace::Scaled => &scaled,
                        InputSpace::Raw => &raw,
                    };
                    Some(model.predict_proba(features)?)
                } else {
                    None
                };
                Ok((model.name().to_string(), probs))
            })
            .collect()
    }

    fn predictions(&self, x: &[Vec<f64>]) -> Result<Vec<PredictionResult>> {
        let per_model = self.model_probabilities(x)?;
        (0..x.len())
            .map(|i| {
                let rows: Vec<(&str, Option<ClassProbabilities>)> = per_model
                    .iter()
                    .map(|(name, probs)| (name.as_str(), probs.as_ref().map(|p| p[i])))
                    .collect();
                combine(&rows, &self.weights)
            })
            .collect()
    }

    /// Predict a single feature row
    pub fn predict(&self, row: &[f64]) -> Result<PredictionResult> {
        self.predictions(&[row.to_vec()])?
            .pop()
            .ok_or(EnsembleError::InsufficientData { required: 1, actual: 0 })
    }

    /// Predict many rows, one `PredictionResult` each
    pub fn predict_many(&self, x: &[Vec<f64>]) -> Result<Vec<PredictionResult>> {
        self.predictions(x)
    }

    /// Tabular batch prediction with native sub-model labels
    pub fn predict_batch(&self, x: &[Vec<f64>]) -> Result<Vec<BatchRow>> {
        let results = self.predictions(x)?;
        let spaces: BTreeMap<&str, _> = self.models.iter().map(|m| (m.name(), m.label_space())).collect();

        Ok(results
            .into_iter()
            .map(|result| {
                let model_labels = spaces
                    .iter()
                    .map(|(name, space)| {
                        let code = result
                            .model_predictions
                            .get(*name)
                            .map(|p| space.encode_direction(p.label));
                        (name.to_string(), code)
                    })
                    .collect();
                BatchRow {
                    model_labels,
                    ensemble_label: result.label,
                    ensemble_confidence: result.confidence,
                    agreement: result.agreement,
                }
            })
            .collect())
    }
}

/// Restrict weights to the built models; equal weights if none of them is covered
fn align_weights(models: &[Box<dyn DirectionClassifier>], weights: ModelWeights) -> ModelWeights {
    let names: Vec<&str> = models.iter().map(|m| m.name()).collect();
    let aligned: BTreeMap<String, f64> = names.iter().map(|n| (n.to_string(), weights.get(n))).collect();
    match ModelWeights::new(aligned) {
        Ok(w) => w,
        // No models built at all: training rejects this later
        Err(_) => ModelWeights::equal(names).unwrap_or(weights),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSpace;
    use crate::testing::fast_config;

    #[test]
    fn test_oversampled_unknown_labels_stay_unknown() {
        // Bearish and bullish clusters plus a few unrecognized labels, no real neutral
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            x.push(vec![0.05 * i as f64, 0.1]);
            y.push(RawLabel::from("junk"));
        }
        for i in 0..100 {
            x.push(vec![-3.0 - 0.01 * i as f64, -3.0]);
            y.push(RawLabel::Int(-1));
        }
        for i in 0..80 {
            x.push(vec![3.0 + 0.01 * i as f64, 3.0]);
            y.push(RawLabel::Int(1));
        }

        let (_, set, _) = prepare_partitions(&fast_config(), &x, &y, &x[..1], &y[..1], 42).unwrap();
        assert!(set.balance.is_oversampled());
        assert_eq!(set.class_counts, [100, 20, 80]);
        assert_eq!(set.n_original, 200);
        assert_eq!(set.synthetic, 80 + 20);

        let synthetic = &set.labels[set.n_original..];
        assert_eq!(synthetic.iter().filter(|l| l.is_none()).count(), 80);
        assert_eq!(synthetic.iter().filter(|l| **l == Some(Direction::Bullish)).count(), 20);

        // The boost view sees no neutral row at all; the forest view reads them as neutral
        let gb: Vec<f64> = set.labels.iter().map(|l| LabelSpace::Gb.encode_known(*l)).collect();
        assert!(!gb.iter().any(|&code| code == 0.0));
        assert_eq!(gb.iter().filter(|code| code.is_nan()).count(), 100);
        let rf: Vec<f64> = set.labels.iter().map(|l| LabelSpace::Rf.encode_known(*l)).collect();
        assert_eq!(rf.iter().filter(|&&code| code == 1.0).count(), 100);
    }
}
