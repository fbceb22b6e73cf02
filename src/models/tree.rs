//! Decision tree primitives
//!
//! Two growers share one node layout:
//! - `ClassifierGrower`: weighted gini impurity, leaves hold class distributions
//! - `grow_gradient`: second-order gain on (gradient, hessian) pairs, leaves
//!   hold Newton steps, used by the boosted model

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::types::{ClassProbabilities, N_CLASSES};

/// Binary tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node<L> {
    Leaf(L),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node<L>>,
        right: Box<Node<L>>,
    },
}

impl<L> Node<L> {
    /// Walk to the leaf that `row` falls into
    pub fn leaf(&self, row: &[f64]) -> &L {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Growth limits shared by both tree kinds
#[derive(Debug, Clone)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split, all when `None`
    pub max_features: Option<usize>,
}

/// Candidate split found by a sweep
struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Pick the features considered at one node
fn candidate_features(allowed: &[usize], max_features: Option<usize>, rng: &mut StdRng) -> Vec<usize> {
    let mut features = allowed.to_vec();
    if let Some(limit) = max_features {
        if limit < features.len() {
            features.shuffle(rng);
            features.truncate(limit.max(1));
        }
    }
    features
}

fn sort_by_feature(x: &[Vec<f64>], indices: &mut [usize], feature: usize) {
    indices.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
}

fn partition(x: &[Vec<f64>], indices: &[usize], feature: usize, threshold: f64) -> (Vec<usize>, Vec<usize>) {
    indices.iter().partition(|&&i| x[i][feature] <= threshold)
}

// ---------------------------------------------------------------------------
// Classification (gini)
// ---------------------------------------------------------------------------

/// Grows a weighted gini tree over `indices` (duplicates allowed for bootstraps)
pub struct ClassifierGrower<'a> {
    pub x: &'a [Vec<f64>],
    pub y: &'a [usize],
    pub weights: &'a [f64],
    pub params: &'a TreeParams,
    /// Accumulated impurity decrease per feature
    pub importances: Vec<f64>,
}

impl<'a> ClassifierGrower<'a> {
    pub fn new(x: &'a [Vec<f64>], y: &'a [usize], weights: &'a [f64], params: &'a TreeParams) -> Self {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        Self {
            x,
            y,
            weights,
            params,
            importances: vec![0.0; n_features],
        }
    }

    pub fn grow(&mut self, indices: Vec<usize>, rng: &mut StdRng) -> Node<ClassProbabilities> {
        let allowed: Vec<usize> = (0..self.importances.len()).collect();
        self.build(indices, 0, &allowed, rng)
    }

    fn class_totals(&self, indices: &[usize]) -> [f64; N_CLASSES] {
        let mut totals = [0.0; N_CLASSES];
        for &i in indices {
            totals[self.y[i]] += self.weights[i];
        }
        totals
    }

    fn build(
        &mut self,
        mut indices: Vec<usize>,
        depth: usize,
        allowed: &[usize],
        rng: &mut StdRng,
    ) -> Node<ClassProbabilities> {
        let totals = self.class_totals(&indices);
        let weight: f64 = totals.iter().sum();

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || gini(&totals, weight) < 1e-12
        {
            return Node::Leaf(normalize(totals, weight));
        }

        let features = candidate_features(allowed, self.params.max_features, rng);
        let Some(best) = self.best_split(&mut indices, &features, &totals, weight) else {
            return Node::Leaf(normalize(totals, weight));
        };

        self.importances[best.feature] += best.gain;
        let (left, right) = partition(self.x, &indices, best.feature, best.threshold);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1, allowed, rng)),
            right: Box::new(self.build(right, depth + 1, allowed, rng)),
        }
    }

    fn best_split(
        &self,
        indices: &mut [usize],
        features: &[usize],
        totals: &[f64; N_CLASSES],
        weight: f64,
    ) -> Option<BestSplit> {
        let parent = weighted_impurity(totals, weight);
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for &feature in features {
            sort_by_feature(self.x, indices, feature);
            let mut left = [0.0; N_CLASSES];

            for pos in 0..indices.len().saturating_sub(1) {
                let i = indices[pos];
                left[self.y[i]] += self.weights[i];

                let n_left = pos + 1;
                if n_left < min_leaf || indices.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.x[i][feature];
                let next = self.x[indices[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let w_left: f64 = left.iter().sum();
                let right: [f64; N_CLASSES] = std::array::from_fn(|c| totals[c] - left[c]);
                let w_right = weight - w_left;
                let gain = parent - weighted_impurity(&left, w_left) - weighted_impurity(&right, w_right);

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

fn gini(totals: &[f64; N_CLASSES], weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    1.0 - totals.iter().map(|c| (c / weight).powi(2)).sum::<f64>()
}

/// `weight * gini`, the quantity a split reduces
fn weighted_impurity(totals: &[f64; N_CLASSES], weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    weight - totals.iter().map(|c| c * c).sum::<f64>() / weight
}

fn normalize(totals: [f64; N_CLASSES], weight: f64) -> ClassProbabilities {
    if weight <= 0.0 {
        return [1.0 / N_CLASSES as f64; N_CLASSES];
    }
    totals.map(|c| c / weight)
}

// ---------------------------------------------------------------------------
// Gradient (Newton) trees
// ---------------------------------------------------------------------------

/// Regularisation for gradient trees
#[derive(Debug, Clone)]
pub struct GradientParams {
    pub tree: TreeParams,
    pub lambda: f64,
    pub min_child_weight: f64,
    /// Multiplier applied to every leaf value
    pub shrinkage: f64,
}

/// Grow a regression tree on per-row gradient/hessian pairs
pub fn grow_gradient(
    x: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    indices: Vec<usize>,
    features: &[usize],
    params: &GradientParams,
) -> Node<f64> {
    build_gradient(x, grad, hess, indices, features, params, 0)
}

fn build_gradient(
    x: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    mut indices: Vec<usize>,
    features: &[usize],
    params: &GradientParams,
    depth: usize,
) -> Node<f64> {
    let g: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h: f64 = indices.iter().map(|&i| hess[i]).sum();
    let leaf = Node::Leaf(-g / (h + params.lambda) * params.shrinkage);

    if depth >= params.tree.max_depth || indices.len() < params.tree.min_samples_split.max(2) {
        return leaf;
    }

    let parent_score = g * g / (h + params.lambda);
    let min_leaf = params.tree.min_samples_leaf.max(1);
    let mut best: Option<BestSplit> = None;

    for &feature in features {
        sort_by_feature(x, &mut indices, feature);
        let (mut g_left, mut h_left) = (0.0, 0.0);

        for pos in 0..indices.len().saturating_sub(1) {
            let i = indices[pos];
            g_left += grad[i];
            h_left += hess[i];

            let n_left = pos + 1;
            if n_left < min_leaf || indices.len() - n_left < min_leaf {
                continue;
            }
            let here = x[i][feature];
            let next = x[indices[pos + 1]][feature];
            if next <= here {
                continue;
            }
            let (g_right, h_right) = (g - g_left, h - h_left);
            if h_left < params.min_child_weight || h_right < params.min_child_weight {
                continue;
            }

            let gain = g_left * g_left / (h_left + params.lambda)
                + g_right * g_right / (h_right + params.lambda)
                - parent_score;
            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }

    match best {
        Some(split) => {
            let (left, right) = partition(x, &indices, split.feature, split.threshold);
            Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(build_gradient(x, grad, hess, left, features, params, depth + 1)),
                right: Box::new(build_gradient(x, grad, hess, right, features, params, depth + 1)),
            }
        }
        None => leaf,
    }
}
