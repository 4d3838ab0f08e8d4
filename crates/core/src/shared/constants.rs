pub const SCORER_MODEL_NAME: &str = "deepfake_classifier.onnx";

/// Side length of the square classifier input.
pub const MODEL_INPUT_SIZE: u32 = 224;

pub const MODEL_INPUT_CHANNELS: usize = 3;

/// Confidence strictly above this percentage is labeled Fake.
pub const FAKE_THRESHOLD_PERCENT: f64 = 50.0;

/// Confidence strictly above this percentage is reported as high confidence.
pub const HIGH_CONFIDENCE_PERCENT: f64 = 80.0;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mpeg"];

/// Frames buffered between the decode and scoring stages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;
