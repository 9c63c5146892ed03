use std::fmt;

use serde::{Deserialize, Serialize};

/// Label emitted when a model index has no entry in the label artifacts.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Label carried by the synthetic entries a batch records for failed items.
pub const ERROR_LABEL: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub filename: String,
    pub media_type: MediaType,
    pub predicted_label: String,
    pub confidence: f32,
}

impl PredictionResult {
    /// Placeholder recorded for a batch item that failed for any reason.
    pub fn error(filename: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            filename: filename.into(),
            media_type,
            predicted_label: ERROR_LABEL.to_string(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<PredictionResult>,
    pub total_processed: usize,
    pub success_count: usize,
    pub error_count: usize,
}

/// Availability of one media type as reported by `/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub media_type: MediaType,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_encoder: Option<bool>,
}
