use ndarray::{Array4, ArrayView4};

/// Classifier input for one frame: `[1, H, W, C]` float32 in `[0, 1]`.
///
/// Keeps the index of the frame it was built from so scores can be matched
/// back to frames after batching.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTensor {
    index: usize,
    data: Array4<f32>,
}

impl FrameTensor {
    /// Wraps an NHWC array. Returns `None` unless the batch dimension is 1.
    pub fn new(index: usize, data: Array4<f32>) -> Option<Self> {
        if data.shape()[0] != 1 {
            return None;
        }
        Some(Self { index, data })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// `(height, width, channels)` without the batch dimension.
    pub fn dims(&self) -> (usize, usize, usize) {
        let s = self.data.shape();
        (s[1], s[2], s[3])
    }
}
