//! Transcription job endpoints: submit, poll, webhook, speaker inference.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::CurrentUser;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::recording::Recording;
use crate::transcription::job::WebhookReply;
use crate::transcription::{SpeakerMapping, Transcription};

/// Transcription as returned to clients: everything except the per-job
/// callback secret.
#[derive(Serialize)]
pub struct TranscriptionView {
    id: String,
    recording_id: String,
    user_id: String,
    external_job_id: Option<String>,
    diarized_transcript: Option<String>,
    text: Option<String>,
    speaker_mapping: Option<HashMap<String, SpeakerMapping>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Transcription> for TranscriptionView {
    fn from(t: Transcription) -> Self {
        Self {
            id: t.id,
            recording_id: t.recording_id,
            user_id: t.user_id,
            external_job_id: t.external_job_id,
            diarized_transcript: t.diarized_transcript,
            text: t.text,
            speaker_mapping: t.speaker_mapping,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct SubmittedResponse {
    message: &'static str,
    external_job_id: Option<String>,
}

pub async fn start_transcription(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(recording_id): Path<String>,
) -> AppResult<Json<SubmittedResponse>> {
    info!("starting transcription for recording {recording_id}");
    let recording = ctx.jobs.submit(&user.id, &recording_id).await?;
    Ok(Json(SubmittedResponse {
        message: "transcription started",
        external_job_id: recording.external_job_id,
    }))
}

/// Poll-driven status inspection; also where stale jobs get timed out.
pub async fn transcription_status(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(recording_id): Path<String>,
) -> AppResult<Json<Recording>> {
    let recording = ctx.jobs.poll(&user.id, &recording_id).await?;
    Ok(Json(recording))
}

pub async fn get_transcription(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(transcription_id): Path<String>,
) -> AppResult<Json<TranscriptionView>> {
    let transcription = ctx
        .jobs
        .transcriptions()
        .get_owned(&transcription_id, &user.id)
        .await?;
    Ok(Json(transcription.into()))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    message: &'static str,
}

pub async fn delete_transcription(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(transcription_id): Path<String>,
) -> AppResult<Json<DeletedResponse>> {
    ctx.jobs.delete_transcription(&user.id, &transcription_id).await?;
    Ok(Json(DeletedResponse {
        message: "transcription deleted",
    }))
}

/// Provider-driven callback endpoint. No user auth: job events authenticate
/// with the per-job callback secret instead, and the challenge/ping
/// handshake carries no state change at all.
pub async fn webhook(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> AppResult<Json<Value>> {
    let event_type = headers
        .get("x-transcription-event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let secret = headers
        .get("x-callback-secret")
        .and_then(|value| value.to_str().ok());
    let body = body.map(|Json(value)| value).unwrap_or_else(|| json!({}));

    info!("transcription webhook received: {event_type}");
    if event_type.is_empty() {
        return Err(AppError::InvalidInput("missing event type header".to_string()));
    }

    match ctx.jobs.handle_webhook(event_type, secret, &body).await? {
        WebhookReply::Ack => Ok(Json(json!({"message": "ok"}))),
        WebhookReply::Challenge(token) => Ok(Json(json!({"validationToken": token}))),
    }
}

#[derive(Serialize)]
pub struct InferredResponse {
    speaker_mapping: HashMap<String, SpeakerMapping>,
    transcript_text: String,
}

pub async fn infer_speaker_names(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(recording_id): Path<String>,
) -> AppResult<Json<InferredResponse>> {
    let (_, inferred) = ctx
        .speakers
        .infer_for_recording(&user.id, &recording_id)
        .await?;
    Ok(Json(InferredResponse {
        speaker_mapping: inferred.mapping,
        transcript_text: inferred.rewritten_transcript,
    }))
}
