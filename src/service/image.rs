use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::{
    error::ServiceError,
    features::extract_image_features,
    model::{MediaType, ModelRegistry, PredictionResult},
    service::{PredictionService, run_blocking, top_class},
};

/// Image path: decode in memory, classify, look the index up in the label map.
#[derive(Clone)]
pub struct ImageService {
    registry: Arc<ModelRegistry>,
}

impl ImageService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PredictionService for ImageService {
    fn media_type(&self) -> MediaType {
        MediaType::Image
    }

    async fn predict(
        &self,
        bytes: Bytes,
        filename: String,
    ) -> Result<PredictionResult, ServiceError> {
        let artifacts = self.registry.image()?;

        run_blocking(move || {
            let tensor = extract_image_features(&bytes)?;
            let scores = artifacts.classifier.predict(tensor.view().into_dyn())?;
            let (index, confidence) = top_class(&scores)?;
            let predicted_label = artifacts.labels.label(index).to_string();

            debug!(%filename, index, confidence, label = %predicted_label, "image classified");
            Ok(PredictionResult {
                filename,
                media_type: MediaType::Image,
                predicted_label,
                confidence,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::UNKNOWN_LABEL,
        test_support::{self as fixtures, png_bytes},
    };

    #[tokio::test]
    async fn classifies_png_with_label_map() {
        let registry = fixtures::registry(vec![0.1, 0.8, 0.1], vec![0.5, 0.5]);
        let service = ImageService::new(registry);

        let result = service
            .predict(png_bytes(), "guitar.png".into())
            .await
            .unwrap();

        assert_eq!(result.filename, "guitar.png");
        assert_eq!(result.media_type, MediaType::Image);
        assert_eq!(result.predicted_label, "guitar");
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn index_outside_label_map_is_unknown() {
        let registry = fixtures::registry(vec![0.0, 0.0, 0.0, 0.0, 0.95], vec![0.5, 0.5]);
        let service = ImageService::new(registry);

        let result = service.predict(png_bytes(), "odd.png".into()).await.unwrap();

        assert_eq!(result.predicted_label, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_extraction_failures() {
        let service = ImageService::new(fixtures::registry(vec![1.0], vec![1.0]));

        let err = service
            .predict(Bytes::from_static(b"\x00\x01garbage"), "bad.jpg".into())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::FeatureExtractionFailed(_)));
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let service = ImageService::new(fixtures::registry_without_image());

        let err = service.predict(png_bytes(), "a.png".into()).await.unwrap_err();

        assert!(matches!(err, ServiceError::ModelUnavailable(MediaType::Image)));
    }

    #[tokio::test]
    async fn inference_errors_are_prediction_failures() {
        let service = ImageService::new(fixtures::failing_registry());

        let err = service.predict(png_bytes(), "a.png".into()).await.unwrap_err();

        assert!(matches!(err, ServiceError::PredictionFailed(_)));
    }
}
