//! HTTP routes: service info, health and the transcription endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fretboard_core::{Error, Transcribe, Transcription, TranscriptionRequest};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

pub const SERVICE_NAME: &str = "guitar-transcription-api";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub transcriber: Arc<dyn Transcribe>,
}

impl AppState {
    pub fn new(transcriber: Arc<dyn Transcribe>) -> Self {
        Self { transcriber }
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/transcribe-youtube", post(transcribe_youtube))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Failure of a transcription request, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Transcription(Error),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Transcription(err) if err.is_client_error() => {
                warn!("rejected transcription: {err}");
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Transcription(err) => {
                error!("transcription failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Internal(msg) => {
                error!("unexpected error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal server error: {msg}"))
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "Guitar Transcription API is running",
        "version": VERSION,
        "endpoints": {
            "transcribe": "/transcribe-youtube",
            "health": "/health",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
    }))
}

async fn transcribe_youtube(
    State(state): State<AppState>,
    Json(request): Json<TranscriptionRequest>,
) -> Result<Json<Transcription>, ApiError> {
    // Downloading and detection block on child processes.
    let transcriber = Arc::clone(&state.transcriber);
    tokio::task::spawn_blocking(move || transcriber.transcribe(&request))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .map_err(ApiError::Transcription)
}
