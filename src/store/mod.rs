// Storage seams for the workflow core
//
// The relational store is the single source of truth. Every mutation a
// transition makes goes through `WorkflowStore::commit_transition`, which must
// apply the whole plan atomically or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::Caller;
use crate::domain::{
    AuditLogEntry, Comment, OutboxEntry, Permission, PermissionGrant, Project, Role,
    RolePermission, User, WorkflowStep,
};
use crate::workflow::transition::{ProjectWorkflow, TransitionPlan};

pub mod error;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Projects, workflow steps and the side-effect records written with them
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert_project(&self, project: &Project) -> StoreResult<()>;

    /// Create the step set for a project exactly once.
    ///
    /// Fails with `AlreadyInitialized` if the project already has steps.
    async fn initialize_steps(&self, project_id: Uuid, steps: &[WorkflowStep]) -> StoreResult<Project>;

    async fn load_workflow(&self, project_id: Uuid) -> StoreResult<ProjectWorkflow>;

    /// Apply a transition plan atomically.
    ///
    /// Fails with `VersionConflict` if the project's version no longer equals
    /// `plan.expected_version`.
    async fn commit_transition(&self, plan: &TransitionPlan) -> StoreResult<()>;

    async fn audit_log(&self, project_id: Uuid) -> StoreResult<Vec<AuditLogEntry>>;

    async fn comments(&self, project_id: Uuid) -> StoreResult<Vec<Comment>>;
}

/// Roles, permissions and grant edges
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_role(&self, role_id: Uuid) -> StoreResult<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    /// Look up a role by name, creating it if missing. Returns whether it was created.
    async fn ensure_role(&self, name: &str, is_admin: bool) -> StoreResult<(Role, bool)>;

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;

    async fn ensure_permission(&self, name: &str, category: &str) -> StoreResult<(Permission, bool)>;

    /// True only for an existing grant row with `granted = true`
    async fn is_granted(&self, role_id: Uuid, permission_name: &str) -> StoreResult<bool>;

    async fn role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<RolePermission>>;

    /// Delete every grant of the role and insert `grants` in one atomic step
    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        grants: &[PermissionGrant],
    ) -> StoreResult<Vec<RolePermission>>;
}

/// User lookup used to resolve a request's caller
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn resolve_caller(&self, user_id: Uuid) -> StoreResult<Option<Caller>>;
}

/// Durable queue of lifecycle events awaiting dispatch
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim the oldest undelivered entry, incrementing its attempt count.
    ///
    /// A claimed entry is taken over once its claim is no older than
    /// `stale_before`. Returns `None` while the oldest undelivered entry is
    /// held by a live claim, so later entries never overtake it.
    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Option<OutboxEntry>>;

    async fn mark_processed(&self, event_id: Uuid) -> StoreResult<()>;

    /// Release a claim after a failed delivery so it is retried
    async fn record_failure(&self, event_id: Uuid, error: &str) -> StoreResult<()>;

    async fn mark_dead_letter(&self, event_id: Uuid, error: &str) -> StoreResult<()>;

    async fn outbox_entries(&self, project_id: Uuid) -> StoreResult<Vec<OutboxEntry>>;
}
