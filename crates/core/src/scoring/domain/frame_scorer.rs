use crate::shared::frame_tensor::FrameTensor;

/// Domain interface for the frame classifier.
///
/// Returns the probability, in `[0, 1]`, that the frame is synthetic.
/// Implementations must be deterministic for a given tensor and keep no
/// memory between frames; `&mut self` only reflects that inference
/// sessions need exclusive access while running.
pub trait FrameScorer: Send {
    fn score(&mut self, tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>>;

    /// Scores several tensors at once, one result per tensor in input order.
    ///
    /// The default scores them one by one; backends that support real
    /// batching override it.
    fn score_batch(
        &mut self,
        tensors: &[FrameTensor],
    ) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
        tensors.iter().map(|t| self.score(t)).collect()
    }
}

impl<S: FrameScorer + ?Sized> FrameScorer for Box<S> {
    fn score(&mut self, tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>> {
        (**self).score(tensor)
    }

    fn score_batch(
        &mut self,
        tensors: &[FrameTensor],
    ) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
        (**self).score_batch(tensors)
    }
}
