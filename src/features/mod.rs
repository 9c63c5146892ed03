//! Feature extraction: raw upload bytes to the tensors the classifiers expect.

pub mod audio;
pub mod image;

use thiserror::Error;

use crate::{error::ServiceError, model::ModelError};

pub use self::audio::{AudioFeatures, SpooledUpload, extract_audio_features, peak_normalize};
pub use self::image::extract_image_features;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to decode input: {0}")]
    Decode(String),
    #[error("audio contains no samples")]
    EmptyWaveform,
    #[error("failed to spool upload: {0}")]
    Spool(#[from] std::io::Error),
    #[error("embedding model failed: {0}")]
    Embedding(#[from] ModelError),
    #[error("{0}")]
    Shape(String),
}

impl From<ExtractionError> for ServiceError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Decode(_) | ExtractionError::EmptyWaveform => {
                ServiceError::FeatureExtractionFailed(err.to_string())
            }
            ExtractionError::Spool(_) | ExtractionError::Embedding(_) | ExtractionError::Shape(_) => {
                ServiceError::PredictionFailed(err.to_string())
            }
        }
    }
}
