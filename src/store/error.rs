use thiserror::Error;
use uuid::Uuid;

use crate::domain::UnknownCode;

/// Errors surfaced by the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The optimistic version token no longer matches the stored project
    #[error("project {project_id} was modified by a concurrent transition")]
    VersionConflict { project_id: Uuid },

    #[error("workflow already initialized for project {project_id}")]
    AlreadyInitialized { project_id: Uuid },

    #[error("duplicate {entity} '{key}'")]
    Duplicate { entity: &'static str, key: String },

    #[error("corrupt {entity} row: {reason}")]
    Corrupt { entity: &'static str, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another writer holds the database lock
    #[error("database busy: {0}")]
    Busy(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn corrupt(entity: &'static str, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            entity,
            reason: reason.to_string(),
        }
    }

    /// Whether a caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::Busy(_)
        )
    }
}

impl From<UnknownCode> for StoreError {
    fn from(err: UnknownCode) -> Self {
        StoreError::Corrupt {
            entity: err.kind,
            reason: err.to_string(),
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if matches!(code.as_ref(), "5" | "6" | "261" | "262" | "517") {
                    return StoreError::Busy(db_err.message().to_string());
                }
            }
        }
        StoreError::Database(err)
    }
}
