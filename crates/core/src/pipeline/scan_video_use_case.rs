use std::path::Path;
use std::time::Instant;

use crate::pipeline::pipeline_executor::PipelineExecutor;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::scan_options::ScanOptions;
use crate::scoring::domain::frame_preprocessor::FramePreprocessor;
use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::shared::scan_error::ScanError;
use crate::verdict::domain::detection_result::{DetectionResult, FrameScore};
use crate::verdict::domain::score_aggregator::{MeanAggregator, ScoreAggregator};
use crate::video::domain::frame_source::FrameSource;
use crate::video::domain::video_reader::VideoReader;

/// Builds a fresh, unopened reader for each run.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn VideoReader> + Send>;

/// Where the last run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming,
    Aggregating,
    Done,
    Failed,
}

/// Scores a video and reduces the frame scores to a verdict.
///
/// Reusable across videos: the scorer, preprocessor and aggregator are
/// kept, and every `run` opens its own `FrameSource` which is released
/// before the result is returned.
pub struct ScanVideoUseCase {
    reader_factory: ReaderFactory,
    preprocessor: FramePreprocessor,
    scorer: Box<dyn FrameScorer>,
    aggregator: Box<dyn ScoreAggregator>,
    executor: Box<dyn PipelineExecutor>,
    logger: Box<dyn PipelineLogger>,
    state: PipelineState,
}

impl ScanVideoUseCase {
    pub fn new(
        reader_factory: ReaderFactory,
        scorer: Box<dyn FrameScorer>,
        executor: Box<dyn PipelineExecutor>,
    ) -> Self {
        Self {
            reader_factory,
            preprocessor: FramePreprocessor::default(),
            scorer,
            aggregator: Box::new(MeanAggregator),
            executor,
            logger: Box::new(NullPipelineLogger),
            state: PipelineState::Idle,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: FramePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn ScoreAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Never panics on bad input: every failure ends up in
    /// [`DetectionResult::error`].
    pub fn run(&mut self, path: &Path, options: &ScanOptions) -> DetectionResult {
        self.state = PipelineState::Opening;
        let started = Instant::now();
        self.logger.info(&format!("Scanning {}", path.display()));

        if !options.is_extension_allowed(path) {
            let reason = format!(
                "unsupported container, expected one of: {}",
                options.allowed_extensions.join(", ")
            );
            return self.fail(ScanError::source_unavailable(path, reason), Vec::new(), Vec::new());
        }

        let source = match FrameSource::open((self.reader_factory)(), path) {
            Ok(source) => source,
            Err(e) => return self.fail(e, Vec::new(), Vec::new()),
        };

        self.state = PipelineState::Streaming;
        let outcome = self.executor.execute(
            source,
            &self.preprocessor,
            self.scorer.as_mut(),
            options,
            self.logger.as_mut(),
        );
        if let Some(error) = outcome.error {
            return self.fail(error, outcome.scores, outcome.skipped);
        }

        self.state = PipelineState::Aggregating;
        let verdict = match self.aggregator.aggregate(&outcome.scores) {
            Ok(verdict) => verdict,
            Err(e) => return self.fail(e, outcome.scores, outcome.skipped),
        };

        self.state = PipelineState::Done;
        self.logger.info(&format!(
            "{}: {} ({:.2}%) from {} frames in {:.2}s",
            path.display(),
            verdict.label,
            verdict.confidence_percent,
            outcome.scores.len(),
            started.elapsed().as_secs_f64()
        ));
        self.logger.summary();

        if outcome.skipped.is_empty() {
            DetectionResult::completed(verdict, outcome.scores)
        } else {
            log::warn!(
                "{} frames could not be scored and were left out",
                outcome.skipped.len()
            );
            DetectionResult::partial(verdict, outcome.scores, outcome.skipped)
        }
    }

    fn fail(
        &mut self,
        error: ScanError,
        scores: Vec<FrameScore>,
        skipped: Vec<usize>,
    ) -> DetectionResult {
        self.state = PipelineState::Failed;
        log::warn!("Scan failed after {} scored frames: {error}", scores.len());
        self.logger.summary();
        DetectionResult::failed(error, scores, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::infrastructure::sequential_pipeline_executor::SequentialPipelineExecutor;
    use crate::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
    use crate::pipeline::scan_options::ScoringPolicy;
    use crate::shared::frame::Frame;
    use crate::shared::frame_tensor::FrameTensor;
    use crate::shared::scan_error::ErrorKind;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::verdict::domain::score_aggregator::Label;
    use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
    use rstest::rstest;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // --- Stubs ---

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        created: AtomicUsize,
    }

    #[derive(Clone)]
    struct ReaderPlan {
        frames: usize,
        fail_open: bool,
        fail_decode_at: Option<usize>,
        bad_channels_at: Option<usize>,
        delay: Duration,
    }

    impl ReaderPlan {
        fn frames(frames: usize) -> Self {
            Self {
                frames,
                fail_open: false,
                fail_decode_at: None,
                bad_channels_at: None,
                delay: Duration::ZERO,
            }
        }
    }

    struct CountingReader {
        plan: ReaderPlan,
        next: usize,
        counters: Arc<Counters>,
    }

    impl VideoReader for CountingReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.plan.fail_open {
                return Err("Invalid data found when processing input".into());
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            let mut metadata = VideoMetadata::unknown(None);
            metadata.width = 16;
            metadata.height = 12;
            metadata.total_frames = self.plan.frames;
            Ok(metadata)
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            if self.next >= self.plan.frames {
                return Ok(None);
            }
            if self.plan.fail_decode_at == Some(self.next) {
                return Err("corrupt packet".into());
            }
            if !self.plan.delay.is_zero() {
                std::thread::sleep(self.plan.delay);
            }
            let index = self.next;
            self.next += 1;
            let frame = if self.plan.bad_channels_at == Some(index) {
                Frame::new(vec![0u8; 16 * 12 * 4], 16, 12, 4, index)
            } else {
                Frame::new(vec![(index % 256) as u8; 16 * 12 * 3], 16, 12, 3, index)
            };
            Ok(Some(frame))
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reader_factory(plan: ReaderPlan) -> (ReaderFactory, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let shared = counters.clone();
        let factory: ReaderFactory = Box::new(move || {
            shared.created.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingReader {
                plan: plan.clone(),
                next: 0,
                counters: shared.clone(),
            }) as Box<dyn VideoReader>
        });
        (factory, counters)
    }

    /// Scores each frame by its index, so order is visible in the trail.
    struct IndexScorer {
        calls: Arc<AtomicUsize>,
        fail_on: HashSet<usize>,
    }

    impl IndexScorer {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_on: HashSet::new(),
            }
        }
    }

    impl FrameScorer for IndexScorer {
        fn score(&mut self, tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&tensor.index()) {
                return Err("inference session rejected input".into());
            }
            Ok((tensor.index() as f64 / 100.0).min(1.0))
        }
    }

    struct ConstantScorer(f64);

    impl FrameScorer for ConstantScorer {
        fn score(&mut self, _tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>> {
            Ok(self.0)
        }
    }

    // --- Helpers ---

    fn executor(threaded: bool) -> Box<dyn PipelineExecutor> {
        if threaded {
            Box::new(ThreadedPipelineExecutor::new())
        } else {
            Box::new(SequentialPipelineExecutor)
        }
    }

    fn use_case(
        plan: ReaderPlan,
        scorer: Box<dyn FrameScorer>,
        threaded: bool,
    ) -> (ScanVideoUseCase, Arc<Counters>) {
        let (factory, counters) = reader_factory(plan);
        (ScanVideoUseCase::new(factory, scorer, executor(threaded)), counters)
    }

    fn clip() -> &'static Path {
        Path::new("/videos/clip.mp4")
    }

    fn wait_for_close(counters: &Counters) {
        let give_up = Instant::now() + Duration::from_secs(5);
        while counters.closes.load(Ordering::SeqCst) == 0 && Instant::now() < give_up {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    // --- Tests ---

    #[rstest]
    fn test_preserves_frame_order(
        #[values(false, true)] threaded: bool,
        #[values(1, 4, 7)] batch_size: usize,
    ) {
        let (mut uc, _) = use_case(ReaderPlan::frames(30), Box::new(IndexScorer::new()), threaded);
        let options = ScanOptions {
            batch_size,
            channel_capacity: 3,
            ..ScanOptions::default()
        };

        let result = uc.run(clip(), &options);

        assert!(result.is_success());
        let indices: Vec<usize> = result.frame_scores().iter().map(|s| s.index).collect();
        assert_eq!(indices, (0..30).collect::<Vec<_>>());
        assert!(result
            .frame_scores()
            .windows(2)
            .all(|pair| pair[0].score < pair[1].score));
    }

    #[rstest]
    fn test_single_frame_at_point_nine_is_fake(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(1), Box::new(ConstantScorer(0.9)), threaded);

        let result = uc.run(clip(), &ScanOptions::default());

        assert_eq!(result.label(), Some(Label::Fake));
        assert_eq!(result.confidence_percent(), Some(90.0));
        assert_eq!(result.frame_scores().len(), 1);
        assert_eq!(uc.state(), PipelineState::Done);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_even_split_is_real(#[values(false, true)] threaded: bool) {
        let (mut uc, _) = use_case(ReaderPlan::frames(6), Box::new(ConstantScorer(0.5)), threaded);
        let result = uc.run(clip(), &ScanOptions::default());
        assert_eq!(result.confidence_percent(), Some(50.0));
        assert_eq!(result.label(), Some(Label::Real));
    }

    #[rstest]
    fn test_repeated_runs_are_identical(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(12), Box::new(IndexScorer::new()), threaded);

        let first = uc.run(clip(), &ScanOptions::default());
        let second = uc.run(clip(), &ScanOptions::default());

        assert_eq!(first, second);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn test_scorer_called_once_per_frame(#[values(false, true)] threaded: bool) {
        let scorer = IndexScorer::new();
        let calls = scorer.calls.clone();
        let (mut uc, _) = use_case(ReaderPlan::frames(9), Box::new(scorer), threaded);

        uc.run(clip(), &ScanOptions::default());

        assert_eq!(calls.load(Ordering::SeqCst), 9);
    }

    #[rstest]
    fn test_zero_frames_is_empty_score_set(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(0), Box::new(ConstantScorer(0.3)), threaded);

        let result = uc.run(clip(), &ScanOptions::default());

        assert_eq!(result.error(), Some(&ScanError::EmptyScoreSet));
        assert_eq!(result.label(), None);
        assert_eq!(uc.state(), PipelineState::Failed);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nonexistent_path_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mp4");
        let mut uc = ScanVideoUseCase::new(
            Box::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
            Box::new(ConstantScorer(0.1)),
            executor(false),
        );

        let result = uc.run(&path, &ScanOptions::default());

        assert_eq!(
            result.error().map(ScanError::kind),
            Some(ErrorKind::SourceUnavailable)
        );
        assert!(result.frame_scores().is_empty());
        assert_eq!(uc.state(), PipelineState::Failed);
    }

    #[test]
    fn test_open_failure_never_closes() {
        let mut plan = ReaderPlan::frames(3);
        plan.fail_open = true;
        let (mut uc, counters) = use_case(plan, Box::new(ConstantScorer(0.1)), false);

        let result = uc.run(clip(), &ScanOptions::default());

        assert!(matches!(
            result.error(),
            Some(ScanError::SourceUnavailable { .. })
        ));
        assert_eq!(counters.opens.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsupported_extension_skips_decoder() {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(3), Box::new(ConstantScorer(0.1)), false);

        let result = uc.run(Path::new("/videos/clip.mkv"), &ScanOptions::default());

        assert_eq!(
            result.error().map(ScanError::kind),
            Some(ErrorKind::SourceUnavailable)
        );
        assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_strict_scoring_failure_keeps_partial_trail(#[values(false, true)] threaded: bool) {
        let mut scorer = IndexScorer::new();
        scorer.fail_on.insert(3);
        let (mut uc, counters) = use_case(ReaderPlan::frames(8), Box::new(scorer), threaded);

        let result = uc.run(clip(), &ScanOptions::default());

        assert!(matches!(
            result.error(),
            Some(ScanError::ScoringFailed { index: 3, .. })
        ));
        assert_eq!(result.label(), None);
        assert_eq!(result.confidence_percent(), None);
        let indices: Vec<usize> = result.frame_scores().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(result.is_partial());
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_best_effort_skips_failed_frames(#[values(false, true)] threaded: bool) {
        let mut scorer = IndexScorer::new();
        scorer.fail_on.extend([2, 5]);
        let (mut uc, _) = use_case(ReaderPlan::frames(8), Box::new(scorer), threaded);
        let options = ScanOptions {
            scoring_policy: ScoringPolicy::BestEffort,
            ..ScanOptions::default()
        };

        let result = uc.run(clip(), &options);

        assert!(result.is_success());
        assert!(result.is_partial());
        assert_eq!(result.skipped_frames(), &[2, 5]);
        assert_eq!(result.frame_scores().len(), 6);
        // mean of 0, 1, 3, 4, 6, 7 hundredths
        assert_eq!(result.confidence_percent(), Some(3.5));
        assert_eq!(uc.state(), PipelineState::Done);
    }

    #[rstest]
    fn test_best_effort_with_every_frame_failing_is_empty(#[values(false, true)] threaded: bool) {
        let mut scorer = IndexScorer::new();
        scorer.fail_on.extend(0..4);
        let (mut uc, _) = use_case(ReaderPlan::frames(4), Box::new(scorer), threaded);
        let options = ScanOptions {
            scoring_policy: ScoringPolicy::BestEffort,
            ..ScanOptions::default()
        };

        let result = uc.run(clip(), &options);

        assert_eq!(result.error(), Some(&ScanError::EmptyScoreSet));
        assert_eq!(result.skipped_frames(), &[0, 1, 2, 3]);
    }

    #[rstest]
    fn test_decode_failure_is_malformed_frame(#[values(false, true)] threaded: bool) {
        let mut plan = ReaderPlan::frames(6);
        plan.fail_decode_at = Some(4);
        let (mut uc, counters) = use_case(plan, Box::new(IndexScorer::new()), threaded);

        let result = uc.run(clip(), &ScanOptions::default());

        assert!(matches!(
            result.error(),
            Some(ScanError::MalformedFrame { index: 4, .. })
        ));
        assert_eq!(result.frame_scores().len(), 4);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_wrong_channel_count_is_malformed_frame(#[values(false, true)] threaded: bool) {
        let mut plan = ReaderPlan::frames(6);
        plan.bad_channels_at = Some(2);
        let (mut uc, counters) = use_case(plan, Box::new(IndexScorer::new()), threaded);

        let result = uc.run(clip(), &ScanOptions::default());

        assert!(matches!(
            result.error(),
            Some(ScanError::MalformedFrame { index: 2, .. })
        ));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_cancel_from_progress_releases_once(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(200), Box::new(IndexScorer::new()), threaded);
        let options = ScanOptions {
            on_progress: Some(Box::new(|done: usize, _total: usize| done < 10)),
            ..ScanOptions::default()
        };

        let result = uc.run(clip(), &options);

        assert_eq!(result.error(), Some(&ScanError::Cancelled));
        assert_eq!(result.frame_scores().len(), 10);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_options_reusable_after_progress_cancel(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(3), Box::new(IndexScorer::new()), threaded);
        let vetoed = Arc::new(AtomicBool::new(false));
        let veto = vetoed.clone();
        let options = ScanOptions {
            on_progress: Some(Box::new(move |_done: usize, _total: usize| {
                veto.swap(true, Ordering::SeqCst)
            })),
            ..ScanOptions::default()
        };

        let first = uc.run(clip(), &options);
        let second = uc.run(clip(), &options);

        assert_eq!(first.error(), Some(&ScanError::Cancelled));
        assert!(second.is_success());
        assert_eq!(second.frame_scores().len(), 3);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn test_cancelled_before_start(#[values(false, true)] threaded: bool) {
        let (mut uc, counters) =
            use_case(ReaderPlan::frames(5), Box::new(IndexScorer::new()), threaded);
        let options = ScanOptions::default();
        options.cancelled.store(true, Ordering::Relaxed);

        let result = uc.run(clip(), &options);

        assert_eq!(result.error(), Some(&ScanError::Cancelled));
        assert!(result.frame_scores().is_empty());
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_timeout_releases_once(#[values(false, true)] threaded: bool) {
        let mut plan = ReaderPlan::frames(500);
        plan.delay = Duration::from_millis(10);
        let (mut uc, counters) = use_case(plan, Box::new(IndexScorer::new()), threaded);
        let options = ScanOptions {
            timeout: Some(Duration::from_millis(80)),
            ..ScanOptions::default()
        };

        let result = uc.run(clip(), &options);

        assert_eq!(
            result.error().map(ScanError::kind),
            Some(ErrorKind::TimedOut)
        );
        assert!(result.frame_scores().len() < 500);
        wait_for_close(&counters);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_starts_idle() {
        let (uc, _) = use_case(ReaderPlan::frames(1), Box::new(ConstantScorer(0.1)), false);
        assert_eq!(uc.state(), PipelineState::Idle);
    }

    #[test]
    fn test_custom_aggregator_is_used() {
        struct MaxAggregator;

        impl ScoreAggregator for MaxAggregator {
            fn aggregate(
                &self,
                scores: &[FrameScore],
            ) -> Result<crate::verdict::domain::score_aggregator::Verdict, ScanError> {
                let max = scores
                    .iter()
                    .map(|s| s.score)
                    .fold(f64::NEG_INFINITY, f64::max);
                Ok(crate::verdict::domain::score_aggregator::Verdict {
                    label: Label::Fake,
                    confidence_percent: max * 100.0,
                })
            }
        }

        let (uc, _) = use_case(ReaderPlan::frames(5), Box::new(IndexScorer::new()), false);
        let mut uc = uc.with_aggregator(Box::new(MaxAggregator));

        let result = uc.run(clip(), &ScanOptions::default());
        approx::assert_relative_eq!(result.confidence_percent().unwrap(), 4.0);
    }
}
