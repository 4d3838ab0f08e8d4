use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::constants::{DEFAULT_CHANNEL_CAPACITY, VIDEO_EXTENSIONS};

/// What to do when the scorer fails on a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// Abort the scan; the result keeps the scores collected so far.
    #[default]
    Strict,
    /// Skip the frame, record its index and keep going.
    BestEffort,
}

/// Per-run knobs for [`ScanVideoUseCase::run`](super::scan_video_use_case::ScanVideoUseCase::run).
pub struct ScanOptions {
    /// Wall-clock budget for decoding and scoring.
    pub timeout: Option<Duration>,
    /// Set from any thread to stop the scan between frames.
    pub cancelled: Arc<AtomicBool>,
    pub scoring_policy: ScoringPolicy,
    /// Tensors handed to the scorer per call.
    pub batch_size: usize,
    /// Lowercase container extensions accepted before the decoder is touched.
    pub allowed_extensions: Vec<String>,
    pub channel_capacity: usize,
    /// Called with `(frames_scored, frames_declared)`; returning `false`
    /// cancels the scan.
    pub on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            scoring_policy: ScoringPolicy::default(),
            batch_size: 1,
            allowed_extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            on_progress: None,
        }
    }
}

impl ScanOptions {
    pub fn is_extension_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
