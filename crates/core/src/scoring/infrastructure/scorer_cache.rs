use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::scoring::domain::frame_scorer::FrameScorer;
use crate::shared::frame_tensor::FrameTensor;

use super::onnx_frame_scorer::OnnxFrameScorer;

type Loader =
    Box<dyn Fn() -> Result<Box<dyn FrameScorer>, Box<dyn std::error::Error>> + Send + Sync>;

#[derive(Error, Debug)]
#[error("failed to load scoring model: {reason}")]
pub struct ModelLoadError {
    pub reason: String,
}

/// Handle to a loaded scorer, cheap to clone and reused across videos.
///
/// Calls are serialized through a mutex; inference sessions need exclusive
/// access while they run.
#[derive(Clone)]
pub struct SharedScorer {
    inner: Arc<Mutex<Box<dyn FrameScorer>>>,
}

impl SharedScorer {
    fn new(scorer: Box<dyn FrameScorer>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scorer)),
        }
    }
}

impl FrameScorer for SharedScorer {
    fn score(&mut self, tensor: &FrameTensor) -> Result<f64, Box<dyn std::error::Error>> {
        let mut scorer = self.inner.lock().map_err(|_| "scorer lock poisoned")?;
        scorer.score(tensor)
    }

    fn score_batch(
        &mut self,
        tensors: &[FrameTensor],
    ) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
        let mut scorer = self.inner.lock().map_err(|_| "scorer lock poisoned")?;
        scorer.score_batch(tensors)
    }
}

/// Lazily loaded, explicitly owned scorer slot.
///
/// The model is loaded on the first [`get`](Self::get) and shared by every
/// later call until [`shutdown`](Self::shutdown). A failed load leaves the
/// slot empty so the next `get` tries again.
pub struct ScorerCache {
    loader: Loader,
    slot: Mutex<Option<SharedScorer>>,
    loads: AtomicUsize,
}

impl ScorerCache {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn FrameScorer>, Box<dyn std::error::Error>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Cache backed by an ONNX model file.
    pub fn onnx(model_path: &Path, output_index: usize) -> Self {
        let model_path: PathBuf = model_path.to_path_buf();
        Self::new(move || {
            let scorer = OnnxFrameScorer::with_output_index(&model_path, output_index)?;
            Ok(Box::new(scorer) as Box<dyn FrameScorer>)
        })
    }

    pub fn get(&self) -> Result<SharedScorer, ModelLoadError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(scorer) = slot.as_ref() {
            return Ok(scorer.clone());
        }

        let scorer = (self.loader)().map_err(|e| ModelLoadError {
            reason: e.to_string(),
        })?;
        let loads = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Scoring model loaded (load #{loads})");

        let shared = SharedScorer::new(scorer);
        *slot = Some(shared.clone());
        Ok(shared)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Successful loads since construction.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Drops the cached scorer. Outstanding `SharedScorer` clones stay
    /// usable until they are dropped; the next `get` loads afresh.
    pub fn shutdown(&self) {
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            log::debug!("Scoring model released");
        }
    }
}
