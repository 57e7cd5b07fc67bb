//! Caller resolution middleware.
//!
//! Reads `X-User-Id`, looks the user and role up in the directory and inserts
//! the resulting `Caller` into the request extensions. Runs on every request.

use std::sync::Arc;

use axum::extract::{Extension, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn resolve_caller(
    Extension(state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthenticated("missing X-User-Id header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated("X-User-Id is not valid text".to_string()))?;
    let user_id = Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Unauthenticated("X-User-Id is not a UUID".to_string()))?;

    let caller = state
        .directory
        .resolve_caller(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated(format!("unknown user {user_id}")))?;

    tracing::debug!(user_id = %caller.user_id, role = %caller.role_name, "Resolved caller");
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
