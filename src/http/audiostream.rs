//! Chunked upload endpoints: open a session, receive chunks, report holes,
//! and on completeness reassemble and persist the recording.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::CurrentUser;
use crate::audiostream::combine_chunks;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

#[derive(Deserialize)]
pub struct StartRequest {
    session_id: Option<String>,
}

#[derive(Serialize)]
pub struct StartResponse {
    message: &'static str,
    session_id: String,
}

pub async fn start_stream(
    State(ctx): State<Arc<AppContext>>,
    _user: CurrentUser,
    Json(request): Json<StartRequest>,
) -> AppResult<Json<StartResponse>> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("session_id is required".to_string()))?;
    ctx.chunks.start_session(&session_id)?;
    Ok(Json(StartResponse {
        message: "audio stream session started",
        session_id,
    }))
}

#[derive(Serialize)]
pub struct ChunkResponse {
    message: &'static str,
    chunk_id: u64,
}

pub async fn upload_chunk(
    State(ctx): State<Arc<AppContext>>,
    _user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<ChunkResponse>> {
    let mut session_id: Option<String> = None;
    let mut chunk_id: Option<u64> = None;
    let mut chunk_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("session_id") => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(e.to_string()))?,
                );
            }
            Some("chunk_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                chunk_id = Some(text.parse().map_err(|_| {
                    AppError::InvalidInput("chunk_id must be a non-negative integer".to_string())
                })?);
            }
            Some("chunk_data") => {
                chunk_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::InvalidInput(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let (Some(session_id), Some(chunk_id), Some(chunk_data)) = (session_id, chunk_id, chunk_data)
    else {
        return Err(AppError::InvalidInput(
            "session_id, chunk_id, and chunk_data are required".to_string(),
        ));
    };

    ctx.chunks.store_chunk(&session_id, chunk_id, chunk_data)?;
    Ok(Json(ChunkResponse {
        message: "chunk received",
        chunk_id,
    }))
}

#[derive(Deserialize)]
pub struct FinishRequest {
    session_id: Option<String>,
    number_of_chunks: Option<u64>,
    /// Client-side filename of the source recording.
    filename: Option<String>,
}

#[derive(Serialize)]
pub struct MissingResponse {
    status: &'static str,
    missing_chunks: Vec<u64>,
}

#[derive(Serialize)]
pub struct CompleteResponse {
    status: &'static str,
    recording_id: String,
}

/// The finish signal commits the client to an expected chunk count. An
/// incomplete session answers 206 with the holes; the client re-uploads
/// just those and calls finish again. A complete one is reassembled and
/// persisted as a Recording.
pub async fn finish_stream(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Json(request): Json<FinishRequest>,
) -> AppResult<Response> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("session_id is required".to_string()))?;
    let number_of_chunks = request
        .number_of_chunks
        .ok_or_else(|| AppError::InvalidInput("number_of_chunks is required".to_string()))?;

    ctx.chunks.finish_session(&session_id, number_of_chunks)?;

    let missing = ctx.chunks.missing_chunks(&session_id)?;
    if !missing.is_empty() {
        info!(
            "session {session_id} incomplete: {} chunks missing",
            missing.len()
        );
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            Json(MissingResponse {
                status: "incomplete",
                missing_chunks: missing,
            }),
        )
            .into_response());
    }

    let chunks = ctx.chunks.all_chunks(&session_id)?;
    let combined = combine_chunks(&chunks).await?;

    let filename = request
        .filename
        .unwrap_or_else(|| format!("{session_id}.mp3"));
    let recording = ctx
        .lifecycle
        .ingest_combined(&user.id, &filename, &combined)
        .await?;

    ctx.chunks.delete_session(&session_id);
    Ok(Json(CompleteResponse {
        status: "complete",
        recording_id: recording.id,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct CheckMissingQuery {
    session_id: String,
}

#[derive(Serialize)]
pub struct CheckMissingResponse {
    missing_chunks: Vec<u64>,
}

pub async fn check_missing(
    State(ctx): State<Arc<AppContext>>,
    _user: CurrentUser,
    Query(query): Query<CheckMissingQuery>,
) -> AppResult<Json<CheckMissingResponse>> {
    let missing = ctx.chunks.missing_chunks(&query.session_id)?;
    Ok(Json(CheckMissingResponse {
        missing_chunks: missing,
    }))
}
