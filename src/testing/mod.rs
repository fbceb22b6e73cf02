//! Test support
//!
//! Provides:
//! - Synthetic ordered datasets with a skewed directional label
//! - A lightweight configuration for fast end-to-end runs

pub mod generators;

pub use generators::{SeriesSpec, TestDataGenerator};

use crate::config::{BoostParams, Config};

/// Production defaults with smaller models and fewer folds
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.walk_forward.n_folds = 3;
    config.forest.n_trees = 25;
    config.forest.max_depth = 6;
    config.boost.walk_forward = BoostParams {
        n_rounds: 120,
        learning_rate: 0.1,
        max_depth: 3,
        early_stopping_rounds: 10,
        ..BoostParams::default()
    };
    config.boost.standard = BoostParams {
        n_rounds: 60,
        max_depth: 3,
        ..BoostParams::default()
    };
    config
}
