//! Core types shared across the ensemble

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EnsembleError;

/// Number of directional classes
pub const N_CLASSES: usize = 3;

/// Probability vector ordered as [bearish, neutral, bullish]
pub type ClassProbabilities = [f64; N_CLASSES];

/// Row-major feature matrix, one row per time step
pub type FeatureMatrix = Vec<Vec<f64>>;

/// Semantic direction label
///
/// Variant order is the class priority order used for tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bearish,
    Neutral,
    Bullish,
}

impl Direction {
    pub const ALL: [Direction; N_CLASSES] = [Direction::Bearish, Direction::Neutral, Direction::Bullish];

    /// Position in a probability vector
    pub fn index(self) -> usize {
        match self {
            Direction::Bearish => 0,
            Direction::Neutral => 1,
            Direction::Bullish => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Signed form (-1, 0, 1)
    pub fn signum(self) -> i8 {
        match self {
            Direction::Bearish => -1,
            Direction::Neutral => 0,
            Direction::Bullish => 1,
        }
    }

    pub fn from_signum(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Direction::Bearish),
            0 => Some(Direction::Neutral),
            1 => Some(Direction::Bullish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
            Direction::Bullish => "bullish",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearish" => Ok(Direction::Bearish),
            "neutral" => Ok(Direction::Neutral),
            "bullish" => Ok(Direction::Bullish),
            other => Err(EnsembleError::InvalidLabel(other.to_string())),
        }
    }
}

/// Class with the highest probability
///
/// Ties go to the later class in priority order (bearish < neutral < bullish),
/// so an exact bearish/bullish tie resolves to bullish.
pub fn argmax_direction(probabilities: &ClassProbabilities) -> Direction {
    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p >= probabilities[best] {
            best = i;
        }
    }
    Direction::ALL[best]
}

/// A label as supplied by the caller, before encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLabel {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawLabel {
    /// Resolve to a semantic direction, `None` when unrecognized
    pub fn direction(&self) -> Option<Direction> {
        match self {
            RawLabel::Int(v) => Direction::from_signum(*v),
            RawLabel::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    Direction::from_signum(*v as i64)
                } else {
                    None
                }
            }
            RawLabel::Text(s) => s.parse().ok(),
        }
    }
}

impl From<i64> for RawLabel {
    fn from(value: i64) -> Self {
        RawLabel::Int(value)
    }
}

impl From<f64> for RawLabel {
    fn from(value: f64) -> Self {
        RawLabel::Float(value)
    }
}

impl From<&str> for RawLabel {
    fn from(value: &str) -> Self {
        RawLabel::Text(value.to_string())
    }
}

impl From<String> for RawLabel {
    fn from(value: String) -> Self {
        RawLabel::Text(value)
    }
}

impl From<Direction> for RawLabel {
    fn from(value: Direction) -> Self {
        RawLabel::Text(value.as_str().to_string())
    }
}
