//! Bagged gini trees (RF-analog)
//!
//! Trains on scaled features and RF-space labels. Trees are grown in parallel,
//! each from its own seed, so the fitted forest does not depend on thread
//! scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::tree::{ClassifierGrower, Node, TreeParams};
use super::{validate_fit_inputs, validate_predict_inputs, DirectionClassifier, EvalSet, InputSpace, ModelKind};
use crate::config::ForestConfig;
use crate::error::{EnsembleError, Result};
use crate::labels::LabelSpace;
use crate::types::{ClassProbabilities, N_CLASSES};

/// Random forest over the three directional classes
pub struct ForestClassifier {
    config: ForestConfig,
    seed: u64,
    trees: Vec<Node<ClassProbabilities>>,
    importances: Vec<f64>,
    n_features: usize,
}

impl ForestClassifier {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            trees: Vec::new(),
            importances: Vec::new(),
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean impurity decrease per feature, normalized to sum to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    fn tree_params(&self, n_features: usize) -> TreeParams {
        let default_features = ((n_features as f64).sqrt().round() as usize).max(1);
        TreeParams {
            max_depth: self.config.max_depth.max(1),
            min_samples_split: self.config.min_samples_split.max(2),
            min_samples_leaf: self.config.min_samples_leaf.max(1),
            max_features: Some(self.config.max_features.unwrap_or(default_features).min(n_features)),
        }
    }
}

impl DirectionClassifier for ForestClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Forest
    }

    fn label_space(&self) -> LabelSpace {
        LabelSpace::Rf
    }

    fn input_space(&self) -> InputSpace {
        InputSpace::Scaled
    }

    fn min_valid_labels(&self) -> usize {
        self.config.min_valid_labels
    }

    fn fit(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        sample_weight: Option<&[f64]>,
        _eval_set: Option<EvalSet<'_>>,
    ) -> Result<()> {
        self.trees.clear();
        self.importances.clear();
        self.n_features = 0;

        let n_features = validate_fit_inputs(ModelKind::Forest, x, y, sample_weight)?;
        let classes = y
            .iter()
            .map(|&code| {
                LabelSpace::Rf
                    .decode(code)
                    .map(|d| d.index())
                    .ok_or_else(|| EnsembleError::InvalidLabel(format!("{} is not an RF-space label", code)))
            })
            .collect::<Result<Vec<usize>>>()?;
        let weights = match sample_weight {
            Some(w) => w.to_vec(),
            None => vec![1.0; x.len()],
        };
        if self.config.n_trees == 0 {
            return Err(EnsembleError::InvalidConfig("forest needs at least one tree".to_string()));
        }

        let params = self.tree_params(n_features);
        let n = x.len();
        let bootstrap = self.config.bootstrap;
        let base_seed = self.seed;

        let grown: Vec<(Node<ClassProbabilities>, Vec<f64>)> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(t as u64));
                let indices: Vec<usize> = if bootstrap {
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut grower = ClassifierGrower::new(x, &classes, &weights, &params);
                let tree = grower.grow(indices, &mut rng);
                (tree, grower.importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for (_, tree_importances) in &grown {
            for (total, v) in importances.iter_mut().zip(tree_importances) {
                *total += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        self.trees = grown.into_iter().map(|(tree, _)| tree).collect();
        self.importances = importances;
        self.n_features = n_features;

        tracing::debug!(
            "Forest fitted: {} trees on {} rows x {} features",
            self.trees.len(),
            n,
            n_features
        );
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<ClassProbabilities>> {
        if self.trees.is_empty() {
            return Err(EnsembleError::model_failure(ModelKind::Forest.name(), "model is not fitted"));
        }
        validate_predict_inputs(ModelKind::Forest, x, self.n_features)?;

        let n_trees = self.trees.len() as f64;
        Ok(x.par_iter()
            .map(|row| {
                let mut probs = [0.0; N_CLASSES];
                for tree in &self.trees {
                    for (acc, p) in probs.iter_mut().zip(tree.leaf(row)) {
                        *acc += p;
                    }
                }
                probs.map(|p| p / n_trees)
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
