mod artifacts;
mod backend;
mod loader;
mod registry;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use artifacts::{ArtifactError, LabelEncoder, LabelMap, Scaler};
pub use backend::{ClassifierModel, EmbeddingModel, ModelBackend, ModelError};
pub use loader::{AudioArtifacts, ImageArtifacts, LoadError, ModelSlot};
pub use registry::{ModelRegistry, RegistryCell};
pub use types::{
    BatchResult, ERROR_LABEL, MediaType, ModelStatus, PredictionResult, UNKNOWN_LABEL,
};

/// Width of one audio embedding frame, and of the pooled vector.
pub const EMBEDDING_DIM: usize = 1024;

/// Spatial size the image classifier was trained on.
pub const IMAGE_SIZE: u32 = 224;

/// Sample rate the audio embedding model expects.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;
