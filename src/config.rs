//! Configuration management
//!
//! Every field carries a serde default so an empty file (or a partial one)
//! resolves to the production defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub walk_forward: WalkForwardConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub forest: ForestConfig,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl Config {
    /// Load from an optional TOML file plus `ENSEMBLE__SECTION__KEY` env overrides
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = shellexpand::tilde(path).into_owned();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("ENSEMBLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Holdout and seeding behaviour of the deployed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Base seed for every stochastic step
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraction of the tail reserved for holdout
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
    /// Minimum holdout rows
    #[serde(default = "default_min_holdout")]
    pub min_holdout: usize,
    /// Below this many rows: no holdout, no scaling, no oversampling
    #[serde(default = "default_holdout_threshold")]
    pub holdout_threshold: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_holdout_fraction() -> f64 {
    0.2
}

fn default_min_holdout() -> usize {
    30
}

fn default_holdout_threshold() -> usize {
    60
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            holdout_fraction: default_holdout_fraction(),
            min_holdout: default_min_holdout(),
            holdout_threshold: default_holdout_threshold(),
        }
    }
}

/// Walk-forward diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Rows dropped between train end and validation start
    #[serde(default = "default_purge_gap")]
    pub purge_gap: usize,
    #[serde(default = "default_min_train_size")]
    pub min_train_size: usize,
    #[serde(default = "default_min_val_size")]
    pub min_val_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_n_folds() -> usize {
    5
}

fn default_purge_gap() -> usize {
    5
}

fn default_min_train_size() -> usize {
    100
}

fn default_min_val_size() -> usize {
    20
}

impl WalkForwardConfig {
    /// Smallest dataset that yields one complete fold
    pub fn min_samples(&self) -> usize {
        self.min_train_size + self.purge_gap + self.min_val_size
    }
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_folds: default_n_folds(),
            purge_gap: default_purge_gap(),
            min_train_size: default_min_train_size(),
            min_val_size: default_min_val_size(),
        }
    }
}

/// Synthetic minority oversampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upper bound on neighbours, further capped at minority count - 1
    #[serde(default = "default_k_neighbors")]
    pub k_neighbors: usize,
}

fn default_k_neighbors() -> usize {
    5
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k_neighbors: default_k_neighbors(),
        }
    }
}

/// Tree-ensemble sub-model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_forest_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Features tried per split; sqrt(n_features) when unset
    #[serde(default)]
    pub max_features: Option<usize>,
    #[serde(default = "default_true")]
    pub bootstrap: bool,
    /// Unknown labels count as neutral here, so any non-empty dataset passes
    #[serde(default = "default_forest_min_labels")]
    pub min_valid_labels: usize,
}

fn default_n_trees() -> usize {
    200
}

fn default_forest_depth() -> usize {
    8
}

fn default_min_samples_split() -> usize {
    4
}

fn default_min_samples_leaf() -> usize {
    2
}

fn default_forest_min_labels() -> usize {
    1
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: default_n_trees(),
            max_depth: default_forest_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            bootstrap: true,
            min_valid_labels: default_forest_min_labels(),
        }
    }
}

/// Boosted-tree sub-model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Training is skipped below this many rows with a valid GB-space label
    #[serde(default = "default_boost_min_labels")]
    pub min_valid_labels: usize,
    /// Profile used when walk-forward mode is enabled
    #[serde(default = "BoostParams::walk_forward")]
    pub walk_forward: BoostParams,
    /// Profile used otherwise
    #[serde(default)]
    pub standard: BoostParams,
}

fn default_boost_min_labels() -> usize {
    50
}

impl BoostConfig {
    pub fn params(&self, walk_forward_mode: bool) -> &BoostParams {
        if walk_forward_mode {
            &self.walk_forward
        } else {
            &self.standard
        }
    }
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_valid_labels: default_boost_min_labels(),
            walk_forward: BoostParams::walk_forward(),
            standard: BoostParams::default(),
        }
    }
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row fraction sampled per round
    pub subsample: f64,
    /// Feature fraction sampled per round
    pub colsample: f64,
    /// L2 regularisation on leaf values
    pub lambda: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
    /// Rounds without eval improvement before stopping
    pub early_stopping_rounds: usize,
}

impl BoostParams {
    pub fn walk_forward() -> Self {
        Self {
            n_rounds: 2000,
            learning_rate: 0.03,
            early_stopping_rounds: 25,
            ..Self::default()
        }
    }
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_rounds: 300,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample: 0.8,
            lambda: 1.0,
            min_child_weight: 1.0,
            early_stopping_rounds: 25,
        }
    }
}

/// Blend weight resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    /// Prediction horizon key used when querying a weight store
    #[serde(default = "default_horizon")]
    pub horizon: String,
    /// Explicit weights; equal weights when absent
    #[serde(default)]
    pub explicit: Option<BTreeMap<String, f64>>,
    /// Per-symbol weights need at least this many recorded samples
    #[serde(default = "default_min_symbol_samples")]
    pub min_symbol_samples: usize,
}

fn default_horizon() -> String {
    "1d".to_string()
}

fn default_min_symbol_samples() -> usize {
    30
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            explicit: None,
            min_symbol_samples: default_min_symbol_samples(),
        }
    }
}
