// HTTP API over the workflow engine and the authorization gate

pub mod error;
pub mod handlers;
pub mod identity;
pub mod router;

use std::sync::Arc;

use crate::auth::AuthorizationGate;
use crate::store::{DirectoryStore, PermissionStore, WorkflowStore};
use crate::workflow::WorkflowEngine;

pub use error::ApiError;
pub use router::build_router;

/// Shared handles injected into every handler
pub struct AppState {
    pub engine: WorkflowEngine,
    pub gate: AuthorizationGate,
    pub workflows: Arc<dyn WorkflowStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub strict_lifecycle_types: bool,
}

impl AppState {
    /// Wire every seam to one backing store
    pub fn from_store<S>(store: Arc<S>, engine: WorkflowEngine, strict_lifecycle_types: bool) -> Self
    where
        S: WorkflowStore + PermissionStore + DirectoryStore + 'static,
    {
        let permissions: Arc<dyn PermissionStore> = store.clone();
        Self {
            engine,
            gate: AuthorizationGate::new(permissions.clone()),
            workflows: store.clone(),
            permissions,
            directory: store,
            strict_lifecycle_types,
        }
    }
}
