use std::path::Path;

use ffmpeg_next::ffi;
use image::{imageops, RgbImage};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Every decoded frame goes through swscale into RGB24, whatever the
/// source pixel format, so downstream stages see a single color order.
/// Frames are turned upright according to the stream's display rotation.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    decoder: Option<ffmpeg_next::decoder::Video>,
    /// Created from the first decoded frame, since some codecs only report
    /// their pixel format once decoding starts.
    scaler: Option<Scaler>,
    video_stream_index: usize,
    /// Clockwise degrees: 0, 90, 180 or 270.
    rotation: i32,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

struct Scaler {
    context: ffmpeg_next::software::scaling::Context,
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            decoder: None,
            scaler: None,
            video_stream_index: 0,
            rotation: 0,
            frame_index: 0,
            flushing: false,
            done: false,
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let decoder = self.decoder.as_mut().ok_or("FfmpegReader: not opened")?;

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if !frame_ready(decoder.receive_frame(&mut decoded), self.frame_index)? {
            return Ok(None);
        }

        let width = decoded.width();
        let height = decoded.height();
        let format = decoded.format();

        let stale = self
            .scaler
            .as_ref()
            .map(|s| s.format != format || s.width != width || s.height != height)
            .unwrap_or(true);
        if stale {
            let context = ffmpeg_next::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some(Scaler {
                context,
                format,
                width,
                height,
            });
        }

        let scaler = self.scaler.as_mut().ok_or("FfmpegReader: scaler missing")?;
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.context.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let (pixels, width, height) = apply_rotation(pixels, width, height, self.rotation)?;
        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let rotation = extract_rotation(&stream);
        let (width, height) = if rotation % 180 == 0 {
            (decoder.width(), decoder.height())
        } else {
            (decoder.height(), decoder.width())
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
            rotation,
        };

        self.video_stream_index = video_stream_index;
        self.rotation = rotation;
        self.decoder = Some(decoder);
        self.input_ctx = Some(ictx);
        self.scaler = None;
        self.frame_index = 0;
        self.flushing = false;
        self.done = false;

        Ok(metadata)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.input_ctx.is_none() {
            return Err("FfmpegReader: not opened".into());
        }
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let ictx = self.input_ctx.as_mut().ok_or("FfmpegReader: not opened")?;
            let decoder = self.decoder.as_mut().ok_or("FfmpegReader: not opened")?;

            let Some((stream, packet)) = ictx.packets().next() else {
                let _ = decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            decoder
                .send_packet(&packet)
                .map_err(|e| format!("corrupt packet after frame {}: {e}", self.frame_index))?;

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn close(&mut self) {
        self.scaler = None;
        self.decoder = None;
        self.input_ctx = None;
        self.done = true;
    }
}

/// Interprets a `receive_frame` result: `true` when a frame was written,
/// `false` when the decoder needs more input or is drained. Anything else is
/// a decode error for the frame at `frame_index`.
fn frame_ready(
    result: Result<(), ffmpeg_next::Error>,
    frame_index: usize,
) -> Result<bool, Box<dyn std::error::Error>> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) | Err(ffmpeg_next::Error::Eof) => {
            Ok(false)
        }
        Err(e) => Err(format!("decoding frame {frame_index} failed: {e}").into()),
    }
}

/// Rotates a packed RGB buffer clockwise by `rotation` degrees, returning
/// the new buffer and its dimensions.
fn apply_rotation(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    rotation: i32,
) -> Result<(Vec<u8>, u32, u32), Box<dyn std::error::Error>> {
    if rotation == 0 {
        return Ok((pixels, width, height));
    }
    let image = RgbImage::from_raw(width, height, pixels).ok_or("frame buffer size mismatch")?;
    let rotated = match rotation {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        other => return Err(format!("unsupported rotation {other}").into()),
    };
    let (w, h) = rotated.dimensions();
    Ok((rotated.into_raw(), w, h))
}

/// Extracts the clockwise display rotation from a video stream.
///
/// Tries stream side data (DisplayMatrix) first, then falls back to the
/// `"rotate"` metadata tag. Returns 0, 90, 180, or 270.
fn extract_rotation(stream: &ffmpeg_next::format::stream::Stream) -> i32 {
    for side_data in stream.side_data() {
        if side_data.kind() == ffmpeg_next::codec::packet::side_data::Type::DisplayMatrix {
            if let Some(angle) = parse_display_matrix(side_data.data()) {
                return normalize_rotation(angle);
            }
        }
    }

    stream
        .metadata()
        .get("rotate")
        .and_then(|s| s.parse::<i32>().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

/// Parses a 3x3 display matrix (9 x i32, 16.16 fixed-point, little-endian)
/// and returns the rotation in degrees.
fn parse_display_matrix(data: &[u8]) -> Option<i32> {
    if data.len() < 36 {
        return None;
    }

    let m00 = i32::from_le_bytes(data[0..4].try_into().ok()?) as f64 / 65536.0;
    let m10 = i32::from_le_bytes(data[4..8].try_into().ok()?) as f64 / 65536.0;

    Some(-m10.atan2(m00).to_degrees().round() as i32)
}

fn normalize_rotation(angle: i32) -> i32 {
    match angle.rem_euclid(360) {
        45..=134 => 90,
        135..=224 => 180,
        225..=315 => 270,
        _ => 0,
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
