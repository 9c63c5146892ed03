use std::path::Path;

use ndarray::{Array2, ArrayViewD};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact missing: {0}")]
    Missing(String),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// A trained classifier: one input tensor in, one score per class out.
///
/// Inputs carry a leading batch dimension of 1 and only the first row of the
/// output is returned.
pub trait ClassifierModel: Send + Sync {
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError>;
}

/// Pretrained audio embedder: a 16 kHz mono waveform in, one embedding row per
/// analysis frame out.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, waveform: &[f32]) -> Result<Array2<f32>, ModelError>;
}

/// Turns artifact paths into runnable models.
pub trait ModelBackend {
    fn load_classifier(&self, path: &Path) -> Result<Box<dyn ClassifierModel>, ModelError>;
    fn load_embedder(&self, path: &Path) -> Result<Box<dyn EmbeddingModel>, ModelError>;
}
