//! TorchScript backend. Models are exported with `torch.jit.trace`/`script`
//! and loaded through libtorch.

use std::path::Path;

use ndarray::{Array2, ArrayViewD};
use parking_lot::Mutex;
use tch::{CModule, Device, IValue, Kind, Tensor, no_grad};
use tracing::debug;

use crate::model::{ClassifierModel, EMBEDDING_DIM, EmbeddingModel, ModelBackend, ModelError};

pub struct TchBackend {
    device: Device,
}

impl TchBackend {
    pub fn new(device: Device) -> Self {
        Self { device }
    }
}

impl ModelBackend for TchBackend {
    fn load_classifier(&self, path: &Path) -> Result<Box<dyn ClassifierModel>, ModelError> {
        Ok(Box::new(TorchModule::load(path, self.device)?))
    }

    fn load_embedder(&self, path: &Path) -> Result<Box<dyn EmbeddingModel>, ModelError> {
        Ok(Box::new(TorchModule::load(path, self.device)?))
    }
}

/// A loaded TorchScript module. libtorch does not promise that one module can
/// be driven from several threads at once, so calls are serialised.
pub struct TorchModule {
    device: Device,
    module: Mutex<CModule>,
}

impl TorchModule {
    pub fn load(path: &Path, device: Device) -> Result<Self, ModelError> {
        let mut module = CModule::load_on_device(path, device)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        module.set_eval();
        debug!(path = %path.display(), ?device, "torchscript module loaded");
        Ok(Self {
            device,
            module: Mutex::new(module),
        })
    }

    fn forward(&self, input: Tensor) -> Result<IValue, ModelError> {
        let input = input.to(self.device);
        let module = self.module.lock();
        no_grad(|| module.forward_is(&[IValue::Tensor(input)]))
            .map_err(|e| ModelError::Inference(e.to_string()))
    }
}

impl ClassifierModel for TorchModule {
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| ModelError::Inference("input tensor is not contiguous".into()))?;
        let tensor = Tensor::from_slice(data).reshape(shape.as_slice());

        let scores = match self.forward(tensor)? {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref items) if !items.is_empty() => match &items[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => return Err(ModelError::Output("expected tensor as first tuple element".into())),
            },
            _ => return Err(ModelError::Output("unsupported classifier output".into())),
        };

        // [1, classes] → first row
        let row = if scores.dim() > 1 { scores.get(0) } else { scores };
        let row = row.to_kind(Kind::Float).to_device(Device::Cpu).flatten(0, -1);
        Vec::<f32>::try_from(&row).map_err(|e| ModelError::Output(e.to_string()))
    }
}

impl EmbeddingModel for TorchModule {
    fn embed(&self, waveform: &[f32]) -> Result<Array2<f32>, ModelError> {
        let tensor = Tensor::from_slice(waveform);

        // YAMNet-style exports return (scores, embeddings, spectrogram).
        let embeddings = match self.forward(tensor)? {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref items) if items.len() >= 2 => match &items[1] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => return Err(ModelError::Output("expected tensor as second tuple element".into())),
            },
            _ => return Err(ModelError::Output("unsupported embedding output".into())),
        };

        let size = embeddings.size();
        let (frames, width) = match size.as_slice() {
            [frames, width] => (*frames as usize, *width as usize),
            [1, frames, width] => (*frames as usize, *width as usize),
            other => {
                return Err(ModelError::Output(format!(
                    "expected [frames, {EMBEDDING_DIM}] embeddings, got {other:?}"
                )));
            }
        };
        let flat = embeddings
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .flatten(0, -1);
        let data = Vec::<f32>::try_from(&flat).map_err(|e| ModelError::Output(e.to_string()))?;
        Array2::from_shape_vec((frames, width), data).map_err(|e| ModelError::Output(e.to_string()))
    }
}
