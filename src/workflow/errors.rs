use thiserror::Error;

use crate::store::StoreError;

/// Failures returned by the workflow engine and the authorization gate.
///
/// Handlers map these one-to-one onto HTTP status codes; nothing here is
/// retried internally.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("insufficient permission: requires {}", .required.join(" or "))]
    Forbidden { required: Vec<String> },

    /// Lost a race against another transition on the same project
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl WorkflowError {
    pub fn invalid_transition(reason: impl Into<String>) -> Self {
        WorkflowError::InvalidTransition {
            reason: reason.into(),
        }
    }

    pub fn forbidden<S: AsRef<str>>(required: &[S]) -> Self {
        WorkflowError::Forbidden {
            required: required.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Conflict { .. })
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            StoreError::VersionConflict { .. }
            | StoreError::AlreadyInitialized { .. }
            | StoreError::Busy(_) => WorkflowError::Conflict {
                reason: err.to_string(),
            },
            StoreError::Duplicate { .. } => WorkflowError::InvalidRequest(err.to_string()),
            other => WorkflowError::Storage(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let err: WorkflowError = StoreError::not_found("project", "p1").into();
        assert!(matches!(err, WorkflowError::NotFound { entity: "project", .. }));

        let err: WorkflowError = StoreError::VersionConflict {
            project_id: Uuid::nil(),
        }
        .into();
        assert!(err.is_conflict());

        let err: WorkflowError = StoreError::AlreadyInitialized {
            project_id: Uuid::nil(),
        }
        .into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_forbidden_names_required_permissions() {
        let err = WorkflowError::forbidden(&["VIEW_PROJECT", "VIEW_ALL_PROJECTS"]);
        assert_eq!(
            err.to_string(),
            "insufficient permission: requires VIEW_PROJECT or VIEW_ALL_PROJECTS"
        );
    }
}
