use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::shared::constants::{FAKE_THRESHOLD_PERCENT, HIGH_CONFIDENCE_PERCENT};
use crate::shared::scan_error::ScanError;
use crate::verdict::domain::score_aggregator::{Label, Verdict};

/// Score the classifier assigned to one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameScore {
    pub index: usize,
    /// Probability in `[0, 1]` that the frame is synthetic.
    pub score: f64,
}

/// How strongly the confidence points at manipulation.
///
/// Presentation only; the label comes from the aggregator alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Interpretation {
    HighConfidenceFake,
    ModerateConfidenceFake,
    LikelyGenuine,
}

impl Interpretation {
    pub fn from_confidence(confidence_percent: f64) -> Self {
        if confidence_percent > HIGH_CONFIDENCE_PERCENT {
            Interpretation::HighConfidenceFake
        } else if confidence_percent > FAKE_THRESHOLD_PERCENT {
            Interpretation::ModerateConfidenceFake
        } else {
            Interpretation::LikelyGenuine
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Interpretation::HighConfidenceFake => {
                "High confidence of manipulation. The video shows strong signs of being a deepfake."
            }
            Interpretation::ModerateConfidenceFake => {
                "Moderate confidence of manipulation. Some frames show signs of synthetic content."
            }
            Interpretation::LikelyGenuine => {
                "Likely genuine. No significant signs of manipulation were detected."
            }
        }
    }
}

/// Outcome of one scan. Built once by the runner and never mutated.
///
/// A completed result has a label and a confidence; a failed one has an
/// error instead, plus whatever scores were collected before the failure.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    verdict: Option<Verdict>,
    frame_scores: Vec<FrameScore>,
    skipped_frames: Vec<usize>,
    error: Option<ScanError>,
}

impl DetectionResult {
    pub fn completed(verdict: Verdict, frame_scores: Vec<FrameScore>) -> Self {
        Self {
            verdict: Some(verdict),
            frame_scores,
            skipped_frames: Vec::new(),
            error: None,
        }
    }

    /// Verdict computed from a trail with holes: `skipped_frames` lists the
    /// frames whose scoring failed and were left out of the mean.
    pub fn partial(
        verdict: Verdict,
        frame_scores: Vec<FrameScore>,
        skipped_frames: Vec<usize>,
    ) -> Self {
        Self {
            verdict: Some(verdict),
            frame_scores,
            skipped_frames,
            error: None,
        }
    }

    pub fn failed(
        error: ScanError,
        frame_scores: Vec<FrameScore>,
        skipped_frames: Vec<usize>,
    ) -> Self {
        Self {
            verdict: None,
            frame_scores,
            skipped_frames,
            error: Some(error),
        }
    }

    pub fn label(&self) -> Option<Label> {
        self.verdict.map(|v| v.label)
    }

    pub fn confidence_percent(&self) -> Option<f64> {
        self.verdict.map(|v| v.confidence_percent)
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn interpretation(&self) -> Option<Interpretation> {
        self.confidence_percent().map(Interpretation::from_confidence)
    }

    pub fn frame_scores(&self) -> &[FrameScore] {
        &self.frame_scores
    }

    pub fn skipped_frames(&self) -> &[usize] {
        &self.skipped_frames
    }

    /// True when frames were dropped from the trail or the scan failed
    /// after scoring some of them.
    pub fn is_partial(&self) -> bool {
        !self.skipped_frames.is_empty() || (self.error.is_some() && !self.frame_scores.is_empty())
    }

    pub fn error(&self) -> Option<&ScanError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// `{"detection", "confidence_score", "frame_scores", "partial"}` on success,
/// with `"skipped_frames"` when frames were dropped and `"error"` in place of
/// the verdict fields on failure.
impl Serialize for DetectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(verdict) = &self.verdict {
            map.serialize_entry("detection", &verdict.label)?;
            map.serialize_entry("confidence_score", &verdict.confidence_percent)?;
        }
        let scores: Vec<f64> = self.frame_scores.iter().map(|s| s.score).collect();
        map.serialize_entry("frame_scores", &scores)?;
        map.serialize_entry("partial", &self.is_partial())?;
        if !self.skipped_frames.is_empty() {
            map.serialize_entry("skipped_frames", &self.skipped_frames)?;
        }
        if let Some(error) = &self.error {
            map.serialize_entry("error", error)?;
        }
        map.end()
    }
}
