//! Directional Ensemble Classifier
//!
//! Predicts a bearish/neutral/bullish label for an ordered financial series by
//! blending a bagged-tree model and a boosted-tree model, validated without
//! temporal leakage.
//!
//! ## Architecture
//!
//! ```text
//! features + labels → WalkForwardSplitter (diagnostics) / holdout split
//!                   → Preprocessor (train-only) → ClassBalancer (train-only)
//!                   → LabelSpace (per model) → DirectionClassifier × 2
//!                   → combine (weighted blend) → PredictionResult
//! ```

pub mod balance;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod testing;
pub mod types;
pub mod validation;
pub mod weights;

pub use ensemble::{DirectionalEnsemble, PredictionResult, TrainingStats};
pub use error::{EnsembleError, Result};
pub use types::{Direction, RawLabel};
