use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use ndarray::Axis;
use tracing::debug;

use crate::{
    error::ServiceError,
    features::extract_audio_features,
    model::{MediaType, ModelRegistry, PredictionResult},
    service::{PredictionService, run_blocking, top_class},
};

/// Audio path: spool, decode, embed and pool, scale, classify, decode the label.
#[derive(Clone)]
pub struct AudioService {
    registry: Arc<ModelRegistry>,
    tmp_dir: Option<PathBuf>,
}

impl AudioService {
    pub fn new(registry: Arc<ModelRegistry>, tmp_dir: Option<PathBuf>) -> Self {
        Self { registry, tmp_dir }
    }
}

#[async_trait]
impl PredictionService for AudioService {
    fn media_type(&self) -> MediaType {
        MediaType::Audio
    }

    async fn predict(
        &self,
        bytes: Bytes,
        filename: String,
    ) -> Result<PredictionResult, ServiceError> {
        let artifacts = self.registry.audio()?;
        let tmp_dir = self.tmp_dir.clone();

        run_blocking(move || {
            let features = extract_audio_features(
                &bytes,
                &filename,
                tmp_dir.as_deref(),
                artifacts.embedder.as_ref(),
            )?;

            let row = features.embedding.insert_axis(Axis(0));
            let row = match artifacts.scaler.as_ref() {
                Some(scaler) => scaler.transform(&row)?,
                None => row,
            };

            let scores = artifacts.classifier.predict(row.view().into_dyn())?;
            let (index, confidence) = top_class(&scores)?;
            let predicted_label = match artifacts.label_encoder.as_ref() {
                Some(encoder) => encoder.inverse_transform(index).to_string(),
                None => index.to_string(),
            };

            debug!(
                %filename,
                duration_s = features.duration_s,
                frames = features.frames,
                index,
                confidence,
                label = %predicted_label,
                "audio classified"
            );
            Ok(PredictionResult {
                filename,
                media_type: MediaType::Audio,
                predicted_label,
                confidence,
            })
        })
        .await
    }
}
