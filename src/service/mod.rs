//! Per-media prediction services and the batch fan-out built on them.

mod audio;
pub mod batch;
mod image;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{BatchResult, MediaType, ModelRegistry, ModelStatus, PredictionResult},
};

pub use self::audio::AudioService;
pub use self::batch::{BatchItem, run_batch};
pub use self::image::ImageService;

/// Runs one upload through extraction, inference and label decoding.
#[async_trait]
pub trait PredictionService: Send + Sync {
    fn media_type(&self) -> MediaType;

    async fn predict(&self, bytes: Bytes, filename: String)
    -> Result<PredictionResult, ServiceError>;
}

/// Entry point used by the route layer.
#[derive(Clone)]
pub struct InferenceService {
    registry: Arc<ModelRegistry>,
    image: ImageService,
    audio: AudioService,
}

impl InferenceService {
    pub fn new(registry: Arc<ModelRegistry>, config: &AppConfig) -> Self {
        Self {
            image: ImageService::new(registry.clone()),
            audio: AudioService::new(registry.clone(), config.upload_tmp_dir.clone()),
            registry,
        }
    }

    pub fn service(&self, media_type: MediaType) -> &dyn PredictionService {
        match media_type {
            MediaType::Image => &self.image,
            MediaType::Audio => &self.audio,
        }
    }

    pub async fn predict_image(
        &self,
        bytes: Bytes,
        filename: String,
    ) -> Result<PredictionResult, ServiceError> {
        self.image.predict(bytes, filename).await
    }

    pub async fn predict_audio(
        &self,
        bytes: Bytes,
        filename: String,
    ) -> Result<PredictionResult, ServiceError> {
        self.audio.predict(bytes, filename).await
    }

    pub async fn predict_batch(&self, media_type: MediaType, items: Vec<BatchItem>) -> BatchResult {
        run_batch(self.service(media_type), items).await
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        self.registry.status()
    }
}

/// Arg-max over a score vector: first maximal index and its score, clamped
/// into `[0, 1]`.
pub(crate) fn top_class(scores: &[f32]) -> Result<(usize, f32), ServiceError> {
    if scores.is_empty() {
        return Err(ServiceError::PredictionFailed("model returned no scores".into()));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ServiceError::PredictionFailed(
            "model returned non-finite scores".into(),
        ));
    }
    let (index, score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, scores[0]), |best, (i, s)| if s > best.1 { (i, s) } else { best });
    Ok((index, score.clamp(0.0, 1.0)))
}

/// Moves CPU-heavy work off the async runtime. A panic in `f` comes back as
/// `PredictionFailed`.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| ServiceError::PredictionFailed(format!("inference task failed: {err}")))?
}
