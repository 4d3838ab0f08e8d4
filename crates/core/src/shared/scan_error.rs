use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed scan, stable for callers to match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    SourceUnavailable,
    MalformedFrame,
    ScoringFailed,
    EmptyScoreSet,
    Cancelled,
    TimedOut,
}

/// Why a scan could not produce a verdict.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ScanError {
    #[error("cannot open video {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("frame {index} is malformed: {reason}")]
    MalformedFrame { index: usize, reason: String },

    #[error("scoring failed on frame {index}: {reason}")]
    ScoringFailed { index: usize, reason: String },

    #[error("no frames could be decoded and scored")]
    EmptyScoreSet,

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan exceeded its {}ms time limit", .limit.as_millis())]
    TimedOut { limit: Duration },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            ScanError::MalformedFrame { .. } => ErrorKind::MalformedFrame,
            ScanError::ScoringFailed { .. } => ErrorKind::ScoringFailed,
            ScanError::EmptyScoreSet => ErrorKind::EmptyScoreSet,
            ScanError::Cancelled => ErrorKind::Cancelled,
            ScanError::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }

    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScanError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(index: usize, reason: impl ToString) -> Self {
        ScanError::MalformedFrame {
            index,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn scoring(index: usize, reason: impl ToString) -> Self {
        ScanError::ScoringFailed {
            index,
            reason: reason.to_string(),
        }
    }
}

/// Serialized form: `{"kind": "...", "message": "..."}`.
impl Serialize for ScanError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ScanError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
