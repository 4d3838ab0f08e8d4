use std::fmt;

use serde::Serialize;

use crate::shared::constants::FAKE_THRESHOLD_PERCENT;
use crate::shared::scan_error::ScanError;
use crate::verdict::domain::detection_result::FrameScore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    Real,
    Fake,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Real => write!(f, "Real"),
            Label::Fake => write!(f, "Fake"),
        }
    }
}

/// Label plus the confidence it was derived from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub label: Label,
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub confidence_percent: f64,
}

/// Reduces an ordered score trail to a single verdict.
pub trait ScoreAggregator: Send {
    fn aggregate(&self, scores: &[FrameScore]) -> Result<Verdict, ScanError>;
}

/// Unweighted mean of the frame scores, as a percentage.
///
/// Confidence strictly above 50 is Fake; exactly 50 is Real. The threshold
/// applies to the rounded value, so the label always agrees with the
/// reported confidence.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanAggregator;

impl ScoreAggregator for MeanAggregator {
    fn aggregate(&self, scores: &[FrameScore]) -> Result<Verdict, ScanError> {
        if scores.is_empty() {
            return Err(ScanError::EmptyScoreSet);
        }

        let sum: f64 = scores.iter().map(|s| s.score).sum();
        let mean = sum / scores.len() as f64;
        let confidence_percent = round_percent(mean * 100.0);

        Ok(Verdict {
            label: label_for(confidence_percent),
            confidence_percent,
        })
    }
}

pub fn label_for(confidence_percent: f64) -> Label {
    if confidence_percent > FAKE_THRESHOLD_PERCENT {
        Label::Fake
    } else {
        Label::Real
    }
}

/// Rounds to two decimals, halves away from zero.
///
/// Scaling by 100 can land a hair below the half (1.005 * 100 is
/// 100.49999999999999), so the product is snapped to 9 decimals before
/// rounding.
pub fn round_percent(value: f64) -> f64 {
    let scaled = value * 100.0;
    let snapped = (scaled * 1e9).round() / 1e9;
    snapped.round() / 100.0
}
