//! Read and delete endpoints for recordings.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use super::CurrentUser;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::recording::Recording;

pub async fn list_recordings(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Recording>>> {
    let recordings = ctx.recordings.list_for_user(&user.id).await?;
    Ok(Json(recordings))
}

pub async fn get_recording(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(recording_id): Path<String>,
) -> AppResult<Json<Recording>> {
    let recording = ctx.recordings.get_owned(&recording_id, &user.id).await?;
    Ok(Json(recording))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    message: &'static str,
}

/// Delete a recording: its audio leaves the byte store and any linked
/// transcription goes with it.
pub async fn delete_recording(
    State(ctx): State<Arc<AppContext>>,
    user: CurrentUser,
    Path(recording_id): Path<String>,
) -> AppResult<Json<DeletedResponse>> {
    let recording = ctx.recordings.get_owned(&recording_id, &user.id).await?;
    ctx.jobs.delete_for_recording(&recording.id).await?;
    ctx.lifecycle.delete(&recording).await?;
    Ok(Json(DeletedResponse {
        message: "recording deleted",
    }))
}
