use std::time::Instant;

use crate::pipeline::pipeline_executor::{
    elapsed_ms, Deadline, PipelineExecutor, ScoreSink, StreamOutcome,
};
use crate::pipeline::pipeline_logger::{PipelineLogger, STAGE_DECODE, STAGE_PREPROCESS};
use crate::pipeline::scan_options::ScanOptions;
use crate::scoring::domain::frame_preprocessor::FramePreprocessor;
use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::video::domain::frame_source::FrameSource;

/// Decodes, prepares and scores on the calling thread, one frame at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialPipelineExecutor;

impl PipelineExecutor for SequentialPipelineExecutor {
    fn execute(
        &self,
        mut source: FrameSource,
        preprocessor: &FramePreprocessor,
        scorer: &mut dyn FrameScorer,
        options: &ScanOptions,
        logger: &mut dyn PipelineLogger,
    ) -> StreamOutcome {
        let deadline = Deadline::start(options.timeout);
        let total_frames = source.metadata().total_frames;
        let mut sink = ScoreSink::new(scorer, options, logger, total_frames);

        let error = loop {
            if let Err(e) = deadline.check(options) {
                break Some(e);
            }

            let start = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break sink.flush().err(),
                Err(e) => break Some(e),
            };
            sink.logger().timing(STAGE_DECODE, elapsed_ms(start));

            let start = Instant::now();
            let tensor = match preprocessor.prepare(&frame) {
                Ok(tensor) => tensor,
                Err(e) => break Some(e),
            };
            sink.logger().timing(STAGE_PREPROCESS, elapsed_ms(start));

            if let Err(e) = sink.push(tensor) {
                break Some(e);
            }
        };

        source.release();
        sink.finish(error)
    }
}
