use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{
        AudioArtifacts, ImageArtifacts, MediaType, ModelBackend, ModelSlot, ModelStatus,
    },
};

/// Owns every model handle for the lifetime of the process. Read-only once
/// built; each media type loads independently so one failure leaves the
/// other servable.
#[derive(Debug)]
pub struct ModelRegistry {
    image: ModelSlot<ImageArtifacts>,
    audio: ModelSlot<AudioArtifacts>,
}

impl ModelRegistry {
    pub fn load(config: &AppConfig, backend: &dyn ModelBackend) -> Self {
        let image = ModelSlot::from_result(ImageArtifacts::load(config, backend));
        if let Some(reason) = image.reason() {
            error!(media_type = %MediaType::Image, %reason, "failed to load model");
        }

        let audio = ModelSlot::from_result(AudioArtifacts::load(config, backend));
        if let Some(reason) = audio.reason() {
            error!(media_type = %MediaType::Audio, %reason, "failed to load model");
        }

        info!(
            image = image.is_loaded(),
            audio = audio.is_loaded(),
            "model registry initialised"
        );
        Self { image, audio }
    }

    pub fn from_parts(image: ModelSlot<ImageArtifacts>, audio: ModelSlot<AudioArtifacts>) -> Self {
        Self { image, audio }
    }

    pub fn image(&self) -> Result<Arc<ImageArtifacts>, ServiceError> {
        self.image
            .loaded()
            .cloned()
            .ok_or(ServiceError::ModelUnavailable(MediaType::Image))
    }

    pub fn audio(&self) -> Result<Arc<AudioArtifacts>, ServiceError> {
        self.audio
            .loaded()
            .cloned()
            .ok_or(ServiceError::ModelUnavailable(MediaType::Audio))
    }

    pub fn is_available(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Image => self.image.is_loaded(),
            MediaType::Audio => self.audio.is_loaded(),
        }
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        let image = ModelStatus {
            media_type: MediaType::Image,
            available: self.image.is_loaded(),
            reason: self.image.reason().map(str::to_string),
            classes: self.image.loaded().map(|a| a.labels.len()),
            scaler: None,
            label_encoder: None,
        };
        let audio = ModelStatus {
            media_type: MediaType::Audio,
            available: self.audio.is_loaded(),
            reason: self.audio.reason().map(str::to_string),
            classes: self
                .audio
                .loaded()
                .and_then(|a| a.label_encoder.as_ref().map(|e| e.len())),
            scaler: self.audio.loaded().map(|a| a.scaler.is_some()),
            label_encoder: self.audio.loaded().map(|a| a.label_encoder.is_some()),
        };
        vec![image, audio]
    }
}

/// One-time initialisation barrier around the registry.
///
/// The first `get_or_load` runs the loader; every later call (from any
/// thread) gets the same `Arc` back without touching the artifacts again.
#[derive(Default)]
pub struct RegistryCell {
    cell: OnceCell<Arc<ModelRegistry>>,
}

impl RegistryCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, config: &AppConfig, backend: &dyn ModelBackend) -> Arc<ModelRegistry> {
        self.get_or_init(|| ModelRegistry::load(config, backend))
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> ModelRegistry) -> Arc<ModelRegistry> {
        self.cell.get_or_init(|| Arc::new(init())).clone()
    }

    pub fn get(&self) -> Option<Arc<ModelRegistry>> {
        self.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use ndarray::{Array2, ArrayViewD};

    use super::*;
    use crate::model::{ClassifierModel, EmbeddingModel, ModelError};

    struct Constant;

    impl ClassifierModel for Constant {
        fn predict(&self, _input: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.1, 0.9])
        }
    }

    impl EmbeddingModel for Constant {
        fn embed(&self, _waveform: &[f32]) -> Result<Array2<f32>, ModelError> {
            Ok(Array2::zeros((1, crate::model::EMBEDDING_DIM)))
        }
    }

    /// Loads anything that exists on disk, counting loads.
    #[derive(Default)]
    struct CountingBackend {
        loads: AtomicUsize,
    }

    impl ModelBackend for CountingBackend {
        fn load_classifier(&self, _path: &Path) -> Result<Box<dyn ClassifierModel>, ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Constant))
        }

        fn load_embedder(&self, _path: &Path) -> Result<Box<dyn EmbeddingModel>, ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Constant))
        }
    }

    fn config_in(dir: &Path) -> AppConfig {
        AppConfig {
            image_model_path: dir.join("image.pt"),
            image_labels_path: dir.join("image_labels.json"),
            audio_model_path: dir.join("audio.pt"),
            audio_label_encoder_path: dir.join("label_encoder.json"),
            audio_scaler_path: dir.join("scaler.json"),
            audio_embedding_model_path: dir.join("yamnet.pt"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn image_failure_leaves_audio_servable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.audio_model_path, b"weights").unwrap();
        fs::write(&config.audio_embedding_model_path, b"weights").unwrap();

        let registry = ModelRegistry::load(&config, &CountingBackend::default());

        assert!(matches!(
            registry.image(),
            Err(ServiceError::ModelUnavailable(MediaType::Image))
        ));
        let audio = registry.audio().unwrap();
        assert!(audio.scaler.is_none());
        assert!(audio.label_encoder.is_none());
    }

    #[test]
    fn broken_label_map_marks_image_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.image_model_path, b"weights").unwrap();
        fs::write(&config.image_labels_path, r#"{"drum": 0, "harp": 0}"#).unwrap();

        let registry = ModelRegistry::load(&config, &CountingBackend::default());

        assert!(!registry.is_available(MediaType::Image));
        let status = registry.status();
        assert!(status[0].reason.as_deref().unwrap().contains("index 0"));
    }

    #[test]
    fn corrupt_scaler_marks_audio_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.audio_model_path, b"weights").unwrap();
        fs::write(&config.audio_embedding_model_path, b"weights").unwrap();
        fs::write(&config.audio_scaler_path, "{").unwrap();

        let registry = ModelRegistry::load(&config, &CountingBackend::default());

        assert!(!registry.is_available(MediaType::Audio));
    }

    #[test]
    fn cell_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.image_model_path, b"weights").unwrap();
        fs::write(&config.image_labels_path, r#"{"drum": 0, "harp": 1}"#).unwrap();
        let backend = CountingBackend::default();
        let cell = RegistryCell::new();
        assert!(cell.get().is_none());

        let first = cell.get_or_load(&config, &backend);
        let second = cell.get_or_load(&config, &backend);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.status()[0].classes, Some(2));
    }
}
