//! Label codec
//!
//! Maps the shared semantic label space onto each sub-model's native encoding:
//! - RF-space: bearish=0, neutral=1, bullish=2 (unknown labels become neutral)
//! - GB-space: bearish=-1, neutral=0, bullish=1 (unknown labels become NaN)

use serde::{Deserialize, Serialize};

use crate::types::{Direction, RawLabel};

/// Native label encoding of a sub-model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSpace {
    /// Class indices 0/1/2
    Rf,
    /// Signed classes -1/0/1, NaN for unknown
    Gb,
}

impl LabelSpace {
    /// Encode a known direction
    pub fn encode_direction(self, direction: Direction) -> f64 {
        match self {
            LabelSpace::Rf => direction.index() as f64,
            LabelSpace::Gb => f64::from(direction.signum()),
        }
    }

    /// Encode a caller-supplied label
    pub fn encode(self, label: &RawLabel) -> f64 {
        self.encode_known(label.direction())
    }

    /// Encode an already-resolved label, `None` meaning unrecognized
    pub fn encode_known(self, direction: Option<Direction>) -> f64 {
        match (self, direction) {
            (_, Some(direction)) => self.encode_direction(direction),
            (LabelSpace::Rf, None) => self.encode_direction(Direction::Neutral),
            (LabelSpace::Gb, None) => f64::NAN,
        }
    }

    pub fn encode_all(self, labels: &[RawLabel]) -> Vec<f64> {
        labels.iter().map(|l| self.encode(l)).collect()
    }

    /// Exact inverse of `encode_direction`; `None` for NaN or out-of-range codes
    pub fn decode(self, code: f64) -> Option<Direction> {
        if !code.is_finite() || code.fract() != 0.0 {
            return None;
        }
        match self {
            LabelSpace::Rf if code >= 0.0 => Direction::from_index(code as usize),
            LabelSpace::Rf => None,
            LabelSpace::Gb => Direction::from_signum(code as i64),
        }
    }
}

/// Encode labels into RF-space class indices
pub fn encode_rf(labels: &[RawLabel]) -> Vec<usize> {
    labels
        .iter()
        .map(|l| l.direction().unwrap_or(Direction::Neutral).index())
        .collect()
}

/// Encode labels into GB-space, NaN marking unrecognized entries
pub fn encode_gb(labels: &[RawLabel]) -> Vec<f64> {
    LabelSpace::Gb.encode_all(labels)
}

pub fn decode_rf(code: usize) -> Option<Direction> {
    Direction::from_index(code)
}

pub fn decode_gb(code: f64) -> Option<Direction> {
    LabelSpace::Gb.decode(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_inputs() -> Vec<(RawLabel, Direction)> {
        vec![
            (RawLabel::Int(-1), Direction::Bearish),
            (RawLabel::Int(0), Direction::Neutral),
            (RawLabel::Int(1), Direction::Bullish),
            ("bearish".into(), Direction::Bearish),
            ("Neutral".into(), Direction::Neutral),
            ("BULLISH".into(), Direction::Bullish),
        ]
    }

    #[test]
    fn test_rf_encoding() {
        let labels = vec![RawLabel::Int(-1), RawLabel::Int(0), RawLabel::Int(1)];
        assert_eq!(encode_rf(&labels), vec![0, 1, 2]);
    }

    #[test]
    fn test_gb_encoding() {
        let labels: Vec<RawLabel> = vec!["bearish".into(), "neutral".into(), "bullish".into()];
        assert_eq!(encode_gb(&labels), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_round_trip_both_spaces() {
        for (label, expected) in all_inputs() {
            let rf = encode_rf(std::slice::from_ref(&label))[0];
            assert_eq!(decode_rf(rf), Some(expected));

            let gb = encode_gb(std::slice::from_ref(&label))[0];
            assert_eq!(decode_gb(gb), Some(expected));

            for space in [LabelSpace::Rf, LabelSpace::Gb] {
                assert_eq!(space.decode(space.encode(&label)), Some(expected));
            }
        }
    }

    #[test]
    fn test_unknown_labels() {
        let labels = vec![
            RawLabel::Int(5),
            RawLabel::from("sideways"),
            RawLabel::Float(0.5),
            RawLabel::Float(f64::NAN),
        ];

        assert_eq!(encode_rf(&labels), vec![1, 1, 1, 1]);
        assert!(encode_gb(&labels).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_float_labels() {
        let labels = vec![RawLabel::Float(-1.0), RawLabel::Float(1.0)];
        assert_eq!(encode_gb(&labels), vec![-1.0, 1.0]);
        assert_eq!(encode_rf(&labels), vec![0, 2]);
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert_eq!(LabelSpace::Rf.decode(3.0), None);
        assert_eq!(LabelSpace::Rf.decode(-1.0), None);
        assert_eq!(LabelSpace::Gb.decode(2.0), None);
        assert_eq!(LabelSpace::Gb.decode(f64::NAN), None);
        assert_eq!(decode_rf(7), None);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let label: RawLabel = "  bullish ".into();
        assert_eq!(label.direction(), Some(Direction::Bullish));
    }

    #[test]
    fn test_encode_known_treats_none_as_unknown() {
        assert_eq!(LabelSpace::Rf.encode_known(None), 1.0);
        assert!(LabelSpace::Gb.encode_known(None).is_nan());
        assert_eq!(LabelSpace::Gb.encode_known(Some(Direction::Bearish)), -1.0);
    }
}
