use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{BatchResult, MediaType, ModelStatus, PredictionResult},
    service::{BatchItem, InferenceService},
};

const DEFAULT_FILENAME: &str = "upload";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: InferenceService,
}

#[derive(Serialize)]
struct WelcomeResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<ModelStatus>,
}

pub fn build_router(config: Arc<AppConfig>, service: InferenceService) -> Router {
    let cors = cors_layer(&config.cors_origins);
    let body_limit = DefaultBodyLimit::max(config.max_upload_bytes);
    let state = AppState { config, service };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/predict/image", post(predict_image))
        .route("/predict/image/", post(predict_image))
        .route("/predict/audio", post(predict_audio))
        .route("/predict/audio/", post(predict_audio))
        .route("/predict/batch/image", post(batch_image))
        .route("/predict/batch/audio", post(batch_audio))
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Musical Instrument Classifier API",
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.service.status(),
    })
}

async fn predict_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResult>, ServiceError> {
    let item = single_file(multipart).await?;
    let result = state
        .service
        .predict_image(item.bytes, item.filename)
        .await?;
    Ok(Json(result))
}

async fn predict_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResult>, ServiceError> {
    let item = single_file(multipart).await?;
    let result = state
        .service
        .predict_audio(item.bytes, item.filename)
        .await?;
    Ok(Json(result))
}

async fn batch_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ServiceError> {
    run_batch_upload(&state, MediaType::Image, multipart).await
}

async fn batch_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ServiceError> {
    run_batch_upload(&state, MediaType::Audio, multipart).await
}

async fn run_batch_upload(
    state: &AppState,
    media_type: MediaType,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ServiceError> {
    let items = read_files(multipart, "files").await?;
    if items.is_empty() {
        return Err(ServiceError::BadRequest(
            "missing multipart field 'files'".into(),
        ));
    }
    info!(%media_type, count = items.len(), "running batch prediction");
    Ok(Json(state.service.predict_batch(media_type, items).await))
}

async fn single_file(multipart: Multipart) -> Result<BatchItem, ServiceError> {
    read_files(multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::BadRequest("missing multipart field 'file'".into()))
}

/// Collects every part named `field`, in order.
async fn read_files(mut multipart: Multipart, field: &str) -> Result<Vec<BatchItem>, ServiceError> {
    let mut items = Vec::new();
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(e.to_string()))?
    {
        if part.name() != Some(field) {
            continue;
        }
        let filename = part
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let bytes = part
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        items.push(BatchItem::new(bytes, filename));
    }
    Ok(items)
}
