use std::collections::BTreeMap;
use std::time::Instant;

/// Stage names reported through [`PipelineLogger::timing`].
pub const STAGE_DECODE: &str = "decode";
pub const STAGE_PREPROCESS: &str = "preprocess";
pub const STAGE_SCORE: &str = "score";

/// Observer for scan orchestration events.
///
/// Keeps the runner independent of where progress and timings end up
/// (terminal, log file, nothing at all).
pub trait PipelineLogger: Send {
    /// Frames scored so far out of the count declared by the container
    /// (0 when unknown).
    fn progress(&mut self, current: usize, total: usize);

    /// Duration of one stage for one frame or batch.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Point-in-time measurement, e.g. queue depth or batch size.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// End-of-scan report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used by tests and library callers that only want
/// the result.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default, Debug, Clone, PartialEq)]
struct Series {
    count: usize,
    total: f64,
}

impl Series {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Terminal logger: progress every `every_frames` frames through `log`,
/// and a per-stage cost breakdown in [`summary`](PipelineLogger::summary).
pub struct StdoutPipelineLogger {
    every_frames: usize,
    stages: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    started: Instant,
    frames_scored: usize,
}

impl StdoutPipelineLogger {
    pub fn new(every_frames: usize) -> Self {
        Self {
            every_frames: every_frames.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            frames_scored: 0,
        }
    }

    /// Renders the summary, or `None` before anything was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Scan summary ({} frames scored in {:.2}s):",
            self.frames_scored,
            elapsed_ms / 1000.0
        )];

        for (stage, series) in &self.stages {
            let share = if elapsed_ms > 0.0 {
                series.total / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:<10} {:>5} calls  mean {:7.2}ms  total {:8.1}ms  {share:5.1}%",
                series.count,
                series.mean(),
                series.total
            ));
        }

        for (name, series) in &self.metrics {
            lines.push(format!("  {name}: mean {:.2}", series.mean()));
        }

        if self.frames_scored > 0 && elapsed_ms > 0.0 {
            let fps = self.frames_scored as f64 * 1000.0 / elapsed_ms;
            lines.push(format!("  Throughput: {fps:.1} frames/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn stage_mean_ms(&self, stage: &str) -> Option<f64> {
        self.stages.get(stage).map(Series::mean)
    }

    pub fn stage_calls(&self, stage: &str) -> usize {
        self.stages.get(stage).map(|s| s.count).unwrap_or(0)
    }

    pub fn metric_mean(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(Series::mean)
    }

    pub fn frames_scored(&self) -> usize {
        self.frames_scored
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_scored = current;
        if current % self.every_frames != 0 {
            return;
        }
        if total > 0 {
            let pct = (current as f64 / total as f64 * 100.0).min(100.0);
            log::info!("Scored {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Scored {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(3, 10);
        logger.timing(STAGE_SCORE, 4.0);
        logger.metric("queue_depth", 2.0);
        logger.info("scan started");
        logger.summary();
    }

    #[test]
    fn test_stage_means() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing(STAGE_SCORE, 12.0);
        logger.timing(STAGE_SCORE, 18.0);
        logger.timing(STAGE_DECODE, 2.5);

        assert_relative_eq!(logger.stage_mean_ms(STAGE_SCORE).unwrap(), 15.0);
        assert_eq!(logger.stage_calls(STAGE_SCORE), 2);
        assert_relative_eq!(logger.stage_mean_ms(STAGE_DECODE).unwrap(), 2.5);
        assert!(logger.stage_mean_ms(STAGE_PREPROCESS).is_none());
        assert_eq!(logger.stage_calls(STAGE_PREPROCESS), 0);
    }

    #[test]
    fn test_metric_mean() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("queue_depth", 3.0);
        logger.metric("queue_depth", 6.0);
        assert_relative_eq!(logger.metric_mean("queue_depth").unwrap(), 4.5);
    }

    #[test]
    fn test_summary_lists_stages_in_name_order() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(4, 4);
        logger.timing(STAGE_SCORE, 10.0);
        logger.timing(STAGE_DECODE, 1.0);
        logger.timing(STAGE_PREPROCESS, 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Scan summary (4 frames scored"));
        let decode = summary.find("decode").unwrap();
        let preprocess = summary.find("preprocess").unwrap();
        let score = summary.find("score ").unwrap();
        assert!(decode < preprocess && preprocess < score);
        assert!(summary.contains("frames/s"));
    }

    #[test]
    fn test_summary_includes_metrics() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("batch_size", 4.0);
        assert!(logger.summary_string().unwrap().contains("batch_size: mean 4.00"));
    }

    #[test]
    fn test_empty_summary_is_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_frames_scored() {
        let mut logger = StdoutPipelineLogger::new(7);
        for i in 1..=20 {
            logger.progress(i, 0);
        }
        assert_eq!(logger.frames_scored(), 20);
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        let mut logger = StdoutPipelineLogger::new(0);
        logger.progress(1, 1);
        assert_eq!(logger.every_frames, 1);
    }
}
