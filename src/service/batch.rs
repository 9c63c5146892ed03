use bytes::Bytes;
use tracing::{info, warn};

use crate::{
    model::{BatchResult, PredictionResult},
    service::PredictionService,
};

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub bytes: Bytes,
    pub filename: String,
}

impl BatchItem {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }
}

/// Runs every item through `service` in submission order. A failed item is
/// recorded once as an `"Error"` entry and the batch carries on; nothing is
/// retried.
pub async fn run_batch<S>(service: &S, items: Vec<BatchItem>) -> BatchResult
where
    S: PredictionService + ?Sized,
{
    let media_type = service.media_type();
    let total_processed = items.len();
    let mut results = Vec::with_capacity(total_processed);
    let mut success_count = 0;
    let mut error_count = 0;

    for item in items {
        let filename = item.filename.clone();
        match service.predict(item.bytes, item.filename).await {
            Ok(result) => {
                success_count += 1;
                results.push(result);
            }
            Err(err) => {
                warn!(%media_type, %filename, error = %err, "batch item failed");
                error_count += 1;
                results.push(PredictionResult::error(filename, media_type));
            }
        }
    }

    info!(
        %media_type,
        total_processed, success_count, error_count, "batch finished"
    );
    BatchResult {
        results,
        total_processed,
        success_count,
        error_count,
    }
}
