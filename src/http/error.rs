//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable `X-User-Id` header, or it names no known user
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Workflow(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Workflow(err) => match err {
                WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
                WorkflowError::InvalidTransition { .. } | WorkflowError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
                WorkflowError::Conflict { .. } => StatusCode::CONFLICT,
                WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Workflow(err) => match err {
                WorkflowError::NotFound { .. } => "NOT_FOUND",
                WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
                WorkflowError::InvalidRequest(_) => "BAD_REQUEST",
                WorkflowError::Forbidden { .. } => "FORBIDDEN",
                WorkflowError::Conflict { .. } => "CONFLICT",
                WorkflowError::Storage(_) => "INTERNAL",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        match &self {
            Self::Workflow(WorkflowError::Forbidden { required }) => {
                body["required"] = json!(required);
            }
            Self::Workflow(WorkflowError::InvalidTransition { reason }) => {
                body["reason"] = json!(reason);
            }
            Self::Workflow(WorkflowError::Conflict { .. }) => {
                body["retryable"] = json!(true);
            }
            Self::Workflow(WorkflowError::Storage(err)) => {
                tracing::error!(error = %err, "Storage failure while handling request");
                body["message"] = json!("internal storage error");
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::Unauthenticated("missing".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(WorkflowError::invalid_transition("at first stage")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WorkflowError::forbidden(&["ADVANCE_WORKFLOW"])).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(StoreError::not_found("project", "p1")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::Busy("locked".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::corrupt("project", "bad row")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
