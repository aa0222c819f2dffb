//! Signed media serving: the read side of the filesystem blob store's
//! time-limited URLs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};

#[derive(Deserialize)]
pub struct MediaQuery {
    expires: i64,
    token: String,
}

pub async fn serve_media(
    State(ctx): State<Arc<AppContext>>,
    Path(name): Path<String>,
    Query(query): Query<MediaQuery>,
) -> AppResult<Response> {
    if !ctx.media.verify_token(&name, query.expires, &query.token) {
        return Err(AppError::Authentication(
            "invalid or expired media token".to_string(),
        ));
    }

    let path = ctx
        .media
        .local_path(&name)
        .map_err(|_| AppError::NotFound("media"))?;
    let bytes = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response())
}
