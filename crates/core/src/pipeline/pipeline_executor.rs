use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::pipeline::pipeline_logger::{PipelineLogger, STAGE_SCORE};
use crate::pipeline::scan_options::{ScanOptions, ScoringPolicy};
use crate::scoring::domain::frame_preprocessor::FramePreprocessor;
use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::shared::frame_tensor::FrameTensor;
use crate::shared::scan_error::ScanError;
use crate::verdict::domain::detection_result::FrameScore;
use crate::video::domain::frame_source::FrameSource;

/// What the streaming phase produced before it stopped.
#[derive(Debug, Default, PartialEq)]
pub struct StreamOutcome {
    /// Scores in frame order.
    pub scores: Vec<FrameScore>,
    /// Frames dropped under [`ScoringPolicy::BestEffort`].
    pub skipped: Vec<usize>,
    /// Why streaming stopped early, if it did.
    pub error: Option<ScanError>,
}

/// Runs the decode → prepare → score stream for one opened source.
///
/// This is a port: infrastructure decides whether decoding overlaps
/// scoring. Implementations own `source` and must release it before
/// returning (or, after a timeout, as soon as the in-flight decode call
/// returns).
pub trait PipelineExecutor: Send {
    fn execute(
        &self,
        source: FrameSource,
        preprocessor: &FramePreprocessor,
        scorer: &mut dyn FrameScorer,
        options: &ScanOptions,
        logger: &mut dyn PipelineLogger,
    ) -> StreamOutcome;
}

/// Wall-clock budget for one run, started when streaming begins.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    limit: Option<Duration>,
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        Self {
            limit,
            at: limit.map(|l| Instant::now() + l),
        }
    }

    /// Time left, `None` when unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn timed_out(&self) -> ScanError {
        ScanError::TimedOut {
            limit: self.limit.unwrap_or_default(),
        }
    }

    /// Cancellation first, then the deadline.
    pub(crate) fn check(&self, options: &ScanOptions) -> Result<(), ScanError> {
        if options.cancelled.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Err(self.timed_out()),
            _ => Ok(()),
        }
    }
}

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Collects tensors into batches, scores them, and applies the scoring
/// policy. Shared by every executor so they agree on validation, progress
/// and error mapping.
pub(crate) struct ScoreSink<'a> {
    scorer: &'a mut dyn FrameScorer,
    options: &'a ScanOptions,
    logger: &'a mut dyn PipelineLogger,
    total_frames: usize,
    pending: Vec<FrameTensor>,
    scores: Vec<FrameScore>,
    skipped: Vec<usize>,
}

impl<'a> ScoreSink<'a> {
    pub(crate) fn new(
        scorer: &'a mut dyn FrameScorer,
        options: &'a ScanOptions,
        logger: &'a mut dyn PipelineLogger,
        total_frames: usize,
    ) -> Self {
        Self {
            scorer,
            options,
            logger,
            total_frames,
            pending: Vec::with_capacity(options.batch_size.max(1)),
            scores: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn logger(&mut self) -> &mut dyn PipelineLogger {
        &mut *self.logger
    }

    /// Frames handed to the sink so far, scored or not.
    pub(crate) fn frames_seen(&self) -> usize {
        self.scores.len() + self.skipped.len() + self.pending.len()
    }

    /// Queues a tensor, scoring the batch once it is full.
    pub(crate) fn push(&mut self, tensor: FrameTensor) -> Result<(), ScanError> {
        self.pending.push(tensor);
        if self.pending.len() >= self.options.batch_size.max(1) {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Scores whatever is queued.
    pub(crate) fn flush(&mut self) -> Result<(), ScanError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);

        let start = Instant::now();
        let result = self.scorer.score_batch(&batch);
        self.logger.timing(STAGE_SCORE, elapsed_ms(start));
        self.logger.metric("batch_size", batch.len() as f64);

        match result {
            Ok(values) if values.len() == batch.len() => {
                for (tensor, value) in batch.iter().zip(values) {
                    if value.is_finite() && (0.0..=1.0).contains(&value) {
                        self.scores.push(FrameScore {
                            index: tensor.index(),
                            score: value,
                        });
                        self.advance()?;
                    } else {
                        self.reject(
                            tensor.index(),
                            format!("score {value} is outside [0, 1]"),
                        )?;
                    }
                }
            }
            Ok(values) => {
                let reason = format!(
                    "scorer returned {} scores for {} frames",
                    values.len(),
                    batch.len()
                );
                for tensor in &batch {
                    self.reject(tensor.index(), &reason)?;
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for tensor in &batch {
                    self.reject(tensor.index(), &reason)?;
                }
            }
        }
        Ok(())
    }

    fn reject(&mut self, index: usize, reason: impl ToString) -> Result<(), ScanError> {
        let error = ScanError::scoring(index, reason);
        match self.options.scoring_policy {
            ScoringPolicy::Strict => Err(error),
            ScoringPolicy::BestEffort => {
                log::warn!("Skipping frame: {error}");
                self.skipped.push(index);
                self.advance()
            }
        }
    }

    /// Reports one more frame done; the progress callback may cancel this
    /// run. The caller's `cancelled` flag is left alone so the options can
    /// be reused for the next video.
    fn advance(&mut self) -> Result<(), ScanError> {
        let done = self.scores.len() + self.skipped.len();
        self.logger.progress(done, self.total_frames);
        if let Some(callback) = &self.options.on_progress {
            if !callback(done, self.total_frames) {
                return Err(ScanError::Cancelled);
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self, error: Option<ScanError>) -> StreamOutcome {
        StreamOutcome {
            scores: self.scores,
            skipped: self.skipped,
            error,
        }
    }
}
