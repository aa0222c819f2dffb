use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// The authenticated caller.
///
/// Authentication itself is an upstream concern (a gateway or identity proxy
/// terminates it); by the time a request reaches this service the resolved
/// user id travels in the `x-user-id` header. Requests without one are
/// rejected.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Authentication("no resolved user".to_string()))?;
        Ok(CurrentUser { id: id.to_string() })
    }
}
