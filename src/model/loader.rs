use std::{fmt, path::Path, sync::Arc};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    model::{
        ArtifactError, ClassifierModel, EMBEDDING_DIM, EmbeddingModel, LabelEncoder, LabelMap,
        ModelBackend, ModelError, Scaler,
    },
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Outcome of loading one media type at startup.
pub enum ModelSlot<T> {
    Loaded(Arc<T>),
    Unavailable(String),
}

impl<T> ModelSlot<T> {
    pub fn from_result<E: fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ModelSlot::Loaded(Arc::new(value)),
            Err(err) => ModelSlot::Unavailable(err.to_string()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&Arc<T>> {
        match self {
            ModelSlot::Loaded(value) => Some(value),
            ModelSlot::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ModelSlot::Loaded(_) => None,
            ModelSlot::Unavailable(reason) => Some(reason),
        }
    }
}

impl<T> fmt::Debug for ModelSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSlot::Loaded(_) => f.write_str("Loaded"),
            ModelSlot::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

pub struct ImageArtifacts {
    pub classifier: Box<dyn ClassifierModel>,
    pub labels: LabelMap,
}

impl ImageArtifacts {
    pub fn load(config: &AppConfig, backend: &dyn ModelBackend) -> Result<Self, LoadError> {
        ensure_exists(&config.image_model_path)?;
        let classifier = backend.load_classifier(&config.image_model_path)?;
        let labels = LabelMap::from_path(&config.image_labels_path)?;
        info!(
            path = %config.image_model_path.display(),
            classes = labels.len(),
            "image model loaded"
        );
        Ok(Self { classifier, labels })
    }
}

pub struct AudioArtifacts {
    pub classifier: Box<dyn ClassifierModel>,
    pub embedder: Box<dyn EmbeddingModel>,
    pub scaler: Option<Scaler>,
    pub label_encoder: Option<LabelEncoder>,
}

impl AudioArtifacts {
    pub fn load(config: &AppConfig, backend: &dyn ModelBackend) -> Result<Self, LoadError> {
        ensure_exists(&config.audio_model_path)?;
        ensure_exists(&config.audio_embedding_model_path)?;
        let classifier = backend.load_classifier(&config.audio_model_path)?;
        let embedder = backend.load_embedder(&config.audio_embedding_model_path)?;

        let scaler = optional(&config.audio_scaler_path, "scaler", |p| {
            Scaler::from_path(p, EMBEDDING_DIM)
        })?;
        let label_encoder = optional(
            &config.audio_label_encoder_path,
            "label encoder",
            LabelEncoder::from_path,
        )?;

        info!(
            path = %config.audio_model_path.display(),
            scaler = scaler.is_some(),
            label_encoder = label_encoder.is_some(),
            "audio model loaded"
        );
        Ok(Self {
            classifier,
            embedder,
            scaler,
            label_encoder,
        })
    }
}

fn ensure_exists(path: &Path) -> Result<(), ModelError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ModelError::Missing(path.display().to_string()))
    }
}

/// A missing file is tolerated; a present but broken one is not.
fn optional<T>(
    path: &Path,
    what: &str,
    load: impl FnOnce(&Path) -> Result<T, ArtifactError>,
) -> Result<Option<T>, ArtifactError> {
    if !path.exists() {
        warn!(path = %path.display(), "audio {what} not found, continuing without it");
        return Ok(None);
    }
    load(path).map(Some)
}
