//! Directional ensemble: training orchestration and probability blending

mod combiner;
mod trainer;

pub use combiner::{agreement_score, combine, BatchRow, PredictionResult, SubModelPrediction};
pub use trainer::{
    DirectionalEnsemble, EnsembleState, FoldMetrics, MetricSummary, TrainingStats, WalkForwardSummary,
};
