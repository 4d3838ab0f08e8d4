use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    /// Display width, after rotation.
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count declared by the container; 0 when unknown.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
    /// Clockwise display rotation; frames are already turned upright.
    pub rotation: i32,
}

impl VideoMetadata {
    /// Metadata for a source whose container declares nothing useful.
    pub fn unknown(source_path: Option<PathBuf>) -> Self {
        Self {
            width: 0,
            height: 0,
            fps: 0.0,
            total_frames: 0,
            codec: String::new(),
            source_path,
            rotation: 0,
        }
    }
}
