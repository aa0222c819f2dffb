//! HTTP wrapping layer: thin axum adapters over the core components.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::context::AppContext;
use crate::error::AppError;

mod audiostream;
mod auth;
mod media;
mod recordings;
mod transcriptions;

pub use auth::CurrentUser;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/start", post(audiostream::start_stream))
        .route("/upload_chunk", post(audiostream::upload_chunk))
        .route("/finish", post(audiostream::finish_stream))
        .route("/check_missing", get(audiostream::check_missing))
        .route("/recordings", get(recordings::list_recordings))
        .route(
            "/recording/:recording_id",
            get(recordings::get_recording).delete(recordings::delete_recording),
        )
        .route(
            "/start_transcription/:recording_id",
            post(transcriptions::start_transcription),
        )
        .route(
            "/transcription_status/:recording_id",
            get(transcriptions::transcription_status),
        )
        .route(
            "/transcription/:transcription_id",
            get(transcriptions::get_transcription).delete(transcriptions::delete_transcription),
        )
        .route(
            "/transcription_webhook",
            get(transcriptions::webhook).post(transcriptions::webhook),
        )
        .route(
            "/infer_speaker_names/:recording_id",
            get(transcriptions::infer_speaker_names),
        )
        .route("/media/:name", get(media::serve_media))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Structured error payload: machine-readable kind, human-readable message.
#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) | AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::ExternalProvider(_)
            | AppError::CombineFailed(_)
            | AppError::IncompleteMapping(_)
            | AppError::InvalidProviderResponse(_)
            | AppError::Store(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("request failed: {self}");
        }

        let body = ErrorBody {
            kind: self.kind(),
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
