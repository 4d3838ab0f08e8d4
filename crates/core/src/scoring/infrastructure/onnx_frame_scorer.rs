/// Deepfake frame classifier running on ONNX Runtime via `ort`.
///
/// Expects a single-input image classifier that takes a `[N, 224, 224, 3]`
/// (or `[N, 3, 224, 224]`) float32 tensor in `[0, 1]` and emits one row of
/// probabilities per image.
use std::path::Path;

use ndarray::{Array4, ArrayView4, Axis};

use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::shared::frame_tensor::FrameTensor;

use super::execution_provider::{describe_execution_providers, preferred_execution_providers};

/// Element of each output row read as the synthetic probability.
pub const DEFAULT_OUTPUT_INDEX: usize = 0;

/// Memory layout of the model's image input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLayout {
    Nhwc,
    Nchw,
}

pub struct OnnxFrameScorer {
    session: ort::session::Session,
    layout: InputLayout,
    dynamic_batch: bool,
    output_index: usize,
}

impl OnnxFrameScorer {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_output_index(model_path, DEFAULT_OUTPUT_INDEX)
    }

    /// Load the model and inspect its input shape.
    ///
    /// Layout defaults to NHWC (the Keras export convention) when the shape
    /// is dynamic or unreadable.
    pub fn with_output_index(
        model_path: &Path,
        output_index: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let dims: Option<Vec<i64>> = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                Some(shape.iter().copied().collect())
            } else {
                None
            }
        });

        let layout = dims
            .as_deref()
            .and_then(detect_layout)
            .unwrap_or(InputLayout::Nhwc);
        let dynamic_batch = dims
            .as_deref()
            .and_then(|d| d.first().copied())
            .map(|n| n < 0)
            .unwrap_or(false);

        log::info!(
            "Loaded scoring model {} ({layout:?}, dynamic batch: {dynamic_batch}, provider: {})",
            model_path.display(),
            describe_execution_providers()
        );

        Ok(Self {
            session,
            layout,
            dynamic_batch,
            output_index,
        })
    }

    fn run(&mut self, input: Array4<f32>) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("scoring model produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        Ok(output.iter().copied().collect())
    }
}

impl FrameScorer for OnnxFrameScorer {
    fn score(&mut self, tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>> {
        let input = to_layout(tensor.view(), self.layout);
        let values = self.run(input)?;
        probability_at(&values, self.output_index)
    }

    fn score_batch(
        &mut self,
        tensors: &[FrameTensor],
    ) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
        if !self.dynamic_batch || tensors.len() <= 1 {
            return tensors.iter().map(|t| self.score(t)).collect();
        }

        let inputs: Vec<Array4<f32>> = tensors
            .iter()
            .map(|t| to_layout(t.view(), self.layout))
            .collect();
        let views: Vec<ArrayView4<'_, f32>> = inputs.iter().map(|a| a.view()).collect();
        let batch = ndarray::concatenate(Axis(0), &views)?;

        let values = self.run(batch)?;
        if values.len() % tensors.len() != 0 {
            return Err(format!(
                "batch output of {} values cannot be split across {} frames",
                values.len(),
                tensors.len()
            )
            .into());
        }
        values
            .chunks(values.len() / tensors.len())
            .map(|row| probability_at(row, self.output_index))
            .collect()
    }
}

/// Infers NHWC vs NCHW from a 4-D input shape with 3 color channels.
fn detect_layout(dims: &[i64]) -> Option<InputLayout> {
    if dims.len() != 4 {
        return None;
    }
    if dims[3] == 3 {
        Some(InputLayout::Nhwc)
    } else if dims[1] == 3 {
        Some(InputLayout::Nchw)
    } else {
        None
    }
}

/// Rearranges an NHWC tensor into the model's layout, in standard order.
fn to_layout(tensor: ArrayView4<'_, f32>, layout: InputLayout) -> Array4<f32> {
    match layout {
        InputLayout::Nhwc => tensor.to_owned(),
        InputLayout::Nchw => tensor
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned(),
    }
}

fn probability_at(row: &[f32], index: usize) -> Result<f64, Box<dyn std::error::Error>> {
    row.get(index).map(|&p| p as f64).ok_or_else(|| {
        format!(
            "model output has {} values, cannot read index {index}",
            row.len()
        )
        .into()
    })
}
