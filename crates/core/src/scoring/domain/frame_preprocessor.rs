use std::fmt;
use std::str::FromStr;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::shared::constants::{MODEL_INPUT_CHANNELS, MODEL_INPUT_SIZE};
use crate::shared::frame::Frame;
use crate::shared::frame_tensor::FrameTensor;
use crate::shared::scan_error::ScanError;

/// Channel order the scorer was calibrated on.
///
/// Frames are always RGB inside the pipeline; the swap to BGR, if any,
/// happens exactly once, while the tensor is filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    #[default]
    Bgr,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => write!(f, "rgb"),
            ChannelOrder::Bgr => write!(f, "bgr"),
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!("channel order must be 'rgb' or 'bgr', got '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessConfig {
    /// Side length of the square tensor.
    pub input_size: u32,
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: MODEL_INPUT_SIZE,
            channel_order: ChannelOrder::default(),
        }
    }
}

/// Turns a decoded frame into the classifier's input tensor.
///
/// Resizes to `input_size × input_size` with two-tap bilinear sampling (no
/// aspect ratio preservation, no padding), maps `u8` intensities to `f32` by
/// dividing by 255, and lays the result out as NHWC with a batch of 1.
/// Pure: the same frame always yields the same tensor.
///
/// Sampling follows OpenCV's `INTER_LINEAR` on 8-bit images, which the
/// classifier was calibrated on: pixel centers are aligned, only the 2x2
/// nearest source pixels contribute (no low-pass when shrinking), weights
/// are 11-bit fixed point, and an exact 2x shrink averages 2x2 blocks.
#[derive(Clone, Debug, Default)]
pub struct FramePreprocessor {
    config: PreprocessConfig,
}

impl FramePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn prepare(&self, frame: &Frame) -> Result<FrameTensor, ScanError> {
        let index = frame.index();

        if frame.channels() as usize != MODEL_INPUT_CHANNELS {
            return Err(ScanError::malformed(
                index,
                format!(
                    "expected {MODEL_INPUT_CHANNELS} channels, got {}",
                    frame.channels()
                ),
            ));
        }
        if !frame.is_well_formed() {
            return Err(ScanError::malformed(
                index,
                format!(
                    "buffer of {} bytes does not match {}x{}x{}",
                    frame.data().len(),
                    frame.width(),
                    frame.height(),
                    frame.channels()
                ),
            ));
        }

        let side = self.config.input_size as usize;
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let resized = if (width, height) == (side, side) {
            frame.data().to_vec()
        } else if width == side * 2 && height == side * 2 {
            halve(frame.data(), width, side)
        } else {
            resize_linear(frame.data(), width, height, side)
        };

        let order = self.config.channel_order;
        let data = Array4::from_shape_fn((1, side, side, MODEL_INPUT_CHANNELS), |(_, y, x, c)| {
            let src = match order {
                ChannelOrder::Rgb => c,
                ChannelOrder::Bgr => 2 - c,
            };
            resized[(y * side + x) * MODEL_INPUT_CHANNELS + src] as f32 / 255.0
        });

        FrameTensor::new(index, data)
            .ok_or_else(|| ScanError::malformed(index, "tensor batch dimension is not 1"))
    }
}

const COEF_BITS: u32 = 11;
const COEF_SCALE: i64 = 1 << COEF_BITS;

/// Source taps and fixed-point weights for one output coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Tap {
    lo: usize,
    hi: usize,
    w_lo: i64,
    w_hi: i64,
}

fn taps(src: usize, dst: usize) -> Vec<Tap> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let pos = (d as f64 + 0.5) * scale - 0.5;
            let mut lo = pos.floor();
            let mut frac = pos - lo;
            if lo < 0.0 {
                lo = 0.0;
                frac = 0.0;
            }
            let mut lo = lo as usize;
            if lo + 1 >= src {
                lo = src - 1;
                frac = 0.0;
            }
            let w_hi = (frac * COEF_SCALE as f64).round() as i64;
            Tap {
                lo,
                hi: (lo + 1).min(src - 1),
                w_lo: COEF_SCALE - w_hi,
                w_hi,
            }
        })
        .collect()
}

/// Two-tap bilinear resize of packed RGB to `side x side`.
fn resize_linear(data: &[u8], width: usize, height: usize, side: usize) -> Vec<u8> {
    let xs = taps(width, side);
    let ys = taps(height, side);
    let round = 1i64 << (2 * COEF_BITS - 1);
    let px = |y: usize, x: usize, c: usize| data[(y * width + x) * MODEL_INPUT_CHANNELS + c] as i64;

    let mut out = Vec::with_capacity(side * side * MODEL_INPUT_CHANNELS);
    for ty in &ys {
        for tx in &xs {
            for c in 0..MODEL_INPUT_CHANNELS {
                let top = px(ty.lo, tx.lo, c) * tx.w_lo + px(ty.lo, tx.hi, c) * tx.w_hi;
                let bottom = px(ty.hi, tx.lo, c) * tx.w_lo + px(ty.hi, tx.hi, c) * tx.w_hi;
                let value = (top * ty.w_lo + bottom * ty.w_hi + round) >> (2 * COEF_BITS);
                out.push(value.clamp(0, 255) as u8);
            }
        }
    }
    out
}

/// Exact 2x shrink: each output pixel is the rounded mean of a 2x2 block.
fn halve(data: &[u8], width: usize, side: usize) -> Vec<u8> {
    let px = |y: usize, x: usize, c: usize| data[(y * width + x) * MODEL_INPUT_CHANNELS + c] as u32;

    let mut out = Vec::with_capacity(side * side * MODEL_INPUT_CHANNELS);
    for y in 0..side {
        for x in 0..side {
            for c in 0..MODEL_INPUT_CHANNELS {
                let sum = px(2 * y, 2 * x, c)
                    + px(2 * y, 2 * x + 1, c)
                    + px(2 * y + 1, 2 * x, c)
                    + px(2 * y + 1, 2 * x + 1, c);
                out.push(((sum + 2) >> 2) as u8);
            }
        }
    }
    out
}
