use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::model::{ArtifactError, MediaType, ModelError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} model not loaded")]
    ModelUnavailable(MediaType),
    #[error("could not extract features: {0}")]
    FeatureExtractionFailed(String),
    #[error("prediction failed: {0}")]
    PredictionFailed(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::FeatureExtractionFailed(_) | ServiceError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PredictionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ModelError> for ServiceError {
    fn from(err: ModelError) -> Self {
        ServiceError::PredictionFailed(err.to_string())
    }
}

impl From<ArtifactError> for ServiceError {
    fn from(err: ArtifactError) -> Self {
        ServiceError::PredictionFailed(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_status_codes() {
        assert_eq!(
            ServiceError::ModelUnavailable(MediaType::Audio).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::FeatureExtractionFailed("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::PredictionFailed("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unavailable_message_names_media_type() {
        let err = ServiceError::ModelUnavailable(MediaType::Image);
        assert_eq!(err.to_string(), "image model not loaded");
    }
}
