use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::scan_error::ScanError;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Exclusive, forward-only read position over one opened video.
///
/// Owns the reader for the duration of a scan and guarantees that
/// [`VideoReader::close`] runs exactly once: at end of stream, on an explicit
/// [`release`](Self::release), or when the source is dropped (error paths,
/// cancellation, panics unwinding through the owner).
pub struct FrameSource {
    reader: Box<dyn VideoReader>,
    metadata: VideoMetadata,
    path: PathBuf,
    next_index: usize,
    released: bool,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("path", &self.path)
            .field("next_index", &self.next_index)
            .field("released", &self.released)
            .finish()
    }
}

impl FrameSource {
    /// Opens `path` with `reader`.
    ///
    /// On failure nothing was acquired, so the reader is dropped without
    /// `close`.
    pub fn open(mut reader: Box<dyn VideoReader>, path: &Path) -> Result<Self, ScanError> {
        let metadata = reader
            .open(path)
            .map_err(|e| ScanError::source_unavailable(path, e))?;

        log::debug!(
            "Opened {} ({}x{}, {:.2} fps, {} frames declared, rotated {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames,
            metadata.rotation
        );

        Ok(Self {
            reader,
            metadata,
            path: path.to_path_buf(),
            next_index: 0,
            released: false,
        })
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Decodes the next frame; `Ok(None)` marks end of stream.
    ///
    /// The handle is released as soon as the stream is exhausted. Calls
    /// after release keep returning `Ok(None)`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        if self.released {
            return Ok(None);
        }

        match self.reader.next_frame() {
            Ok(Some(frame)) => {
                if frame.index() != self.next_index {
                    return Err(ScanError::malformed(
                        self.next_index,
                        format!(
                            "reader produced frame {} out of order, expected {}",
                            frame.index(),
                            self.next_index
                        ),
                    ));
                }
                self.next_index += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                log::debug!(
                    "End of stream for {} after {} frames",
                    self.path.display(),
                    self.next_index
                );
                self.release();
                Ok(None)
            }
            Err(e) => Err(ScanError::malformed(
                self.next_index,
                format!("decode failed: {e}"),
            )),
        }
    }

    /// Releases the decode handle. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.reader.close();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

impl Iterator for FrameSource {
    type Item = Result<Frame, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
