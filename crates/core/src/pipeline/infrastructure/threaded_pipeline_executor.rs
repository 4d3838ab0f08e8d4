use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::pipeline::pipeline_executor::{
    elapsed_ms, Deadline, PipelineExecutor, ScoreSink, StreamOutcome,
};
use crate::pipeline::pipeline_logger::{PipelineLogger, STAGE_DECODE, STAGE_PREPROCESS};
use crate::pipeline::scan_options::ScanOptions;
use crate::scoring::domain::frame_preprocessor::FramePreprocessor;
use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::shared::frame_tensor::FrameTensor;
use crate::shared::scan_error::ScanError;
use crate::video::domain::frame_source::FrameSource;

/// A prepared frame plus what it cost to get it.
struct Packet {
    tensor: FrameTensor,
    decode_ms: f64,
    preprocess_ms: f64,
}

/// `Ok(None)` marks end of stream.
type Message = Result<Option<Packet>, ScanError>;

/// Overlaps decoding with scoring.
///
/// Layout: `reader [decode + prepare] → bounded channel → caller [score]`
///
/// The reader thread owns the `FrameSource` and releases it before it
/// exits. A single producer feeding a FIFO channel keeps frame order.
pub struct ThreadedPipelineExecutor;

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        source: FrameSource,
        preprocessor: &FramePreprocessor,
        scorer: &mut dyn FrameScorer,
        options: &ScanOptions,
        logger: &mut dyn PipelineLogger,
    ) -> StreamOutcome {
        let deadline = Deadline::start(options.timeout);
        let total_frames = source.metadata().total_frames;

        let (tx, rx) = crossbeam_channel::bounded::<Message>(options.channel_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let reader_handle = spawn_reader(
            source,
            preprocessor.clone(),
            tx,
            options.cancelled.clone(),
            stop.clone(),
        );

        let mut sink = ScoreSink::new(scorer, options, logger, total_frames);
        let error = run_score_loop(&rx, &mut sink, &deadline, options);

        stop.store(true, Ordering::Relaxed);
        drop(rx);

        let timed_out = matches!(error, Some(ScanError::TimedOut { .. }));
        let error = if timed_out {
            // The reader may be inside a decode call; it notices the closed
            // channel afterwards and releases the source on its own.
            log::warn!("Scan timed out, detaching reader thread");
            error
        } else {
            join_reader(reader_handle, error)
        };

        sink.finish(error)
    }
}

fn spawn_reader(
    mut source: FrameSource,
    preprocessor: FramePreprocessor,
    tx: Sender<Message>,
    cancelled: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            if cancelled.load(Ordering::Relaxed) || stop.load(Ordering::Relaxed) {
                break;
            }

            let start = Instant::now();
            let message = match source.next_frame() {
                Ok(Some(frame)) => {
                    let decode_ms = elapsed_ms(start);
                    let start = Instant::now();
                    preprocessor.prepare(&frame).map(|tensor| {
                        Some(Packet {
                            tensor,
                            decode_ms,
                            preprocess_ms: elapsed_ms(start),
                        })
                    })
                }
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            let last = !matches!(message, Ok(Some(_)));
            if tx.send(message).is_err() || last {
                break;
            }
        }
        source.release();
    })
}

/// Receives prepared frames in order and scores them until end of stream,
/// an error, cancellation or the deadline.
fn run_score_loop(
    rx: &Receiver<Message>,
    sink: &mut ScoreSink<'_>,
    deadline: &Deadline,
    options: &ScanOptions,
) -> Option<ScanError> {
    loop {
        if let Err(e) = deadline.check(options) {
            return Some(e);
        }

        let received = match deadline.remaining() {
            Some(left) => rx.recv_timeout(left),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Ok(Some(packet))) => {
                sink.logger().timing(STAGE_DECODE, packet.decode_ms);
                sink.logger().timing(STAGE_PREPROCESS, packet.preprocess_ms);
                sink.logger().metric("queue_depth", rx.len() as f64);
                if let Err(e) = sink.push(packet.tensor) {
                    return Some(e);
                }
            }
            Ok(Ok(None)) => return sink.flush().err(),
            Ok(Err(e)) => return Some(e),
            Err(RecvTimeoutError::Timeout) => return Some(deadline.timed_out()),
            Err(RecvTimeoutError::Disconnected) => {
                // Hung up without an end-of-stream marker: cancelled or panicked.
                return Some(deadline.check(options).err().unwrap_or_else(|| {
                    ScanError::malformed(sink.frames_seen(), "reader stopped before end of stream")
                }));
            }
        }
    }
}

/// Waits for the reader so the source is released before returning.
fn join_reader(handle: JoinHandle<()>, error: Option<ScanError>) -> Option<ScanError> {
    if handle.join().is_err() {
        log::error!("Reader thread panicked");
    }
    error
}
