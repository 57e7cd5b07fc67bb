use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Raised when a stored or submitted code does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub value: String,
}

/// Stage-sequence template a project follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleType {
    NewItem,
    TransitioningItem,
    DeletingItem,
}

impl LifecycleType {
    pub const ALL: [LifecycleType; 3] = [
        LifecycleType::NewItem,
        LifecycleType::TransitioningItem,
        LifecycleType::DeletingItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleType::NewItem => "NEW_ITEM",
            LifecycleType::TransitioningItem => "TRANSITIONING_ITEM",
            LifecycleType::DeletingItem => "DELETING_ITEM",
        }
    }

    /// Resolve a lifecycle name, optionally falling back to `NEW_ITEM` for
    /// unrecognised values instead of rejecting them.
    pub fn resolve(value: &str, strict: bool) -> Result<Self, UnknownCode> {
        match value.parse() {
            Ok(lifecycle) => Ok(lifecycle),
            Err(e) if strict => Err(e),
            Err(_) => {
                tracing::warn!(
                    lifecycle_type = %value,
                    "Unknown lifecycle type, falling back to NEW_ITEM"
                );
                Ok(LifecycleType::NewItem)
            }
        }
    }
}

impl FromStr for LifecycleType {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW_ITEM" => Ok(LifecycleType::NewItem),
            "TRANSITIONING_ITEM" => Ok(LifecycleType::TransitioningItem),
            "DELETING_ITEM" => Ok(LifecycleType::DeletingItem),
            _ => Err(UnknownCode {
                kind: "lifecycle type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LifecycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Draft,
    InProgress,
    Completed,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "DRAFT",
            ProjectStatus::InProgress => "IN_PROGRESS",
            ProjectStatus::Completed => "COMPLETED",
            ProjectStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ProjectStatus::Draft),
            "IN_PROGRESS" => Ok(ProjectStatus::InProgress),
            "COMPLETED" => Ok(ProjectStatus::Completed),
            "REJECTED" => Ok(ProjectStatus::Rejected),
            _ => Err(UnknownCode {
                kind: "project status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Rejected => "REJECTED",
            StepStatus::Skipped => "SKIPPED",
        }
    }
}

impl FromStr for StepStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "IN_PROGRESS" => Ok(StepStatus::InProgress),
            "COMPLETED" => Ok(StepStatus::Completed),
            "REJECTED" => Ok(StepStatus::Rejected),
            "SKIPPED" => Ok(StepStatus::Skipped),
            _ => Err(UnknownCode {
                kind: "step status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Procurement project moving through a lifecycle pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub lifecycle_type: LifecycleType,
    pub status: ProjectStatus,
    pub current_stage: String,
    pub created_by_id: Uuid,
    pub organization_id: Option<Uuid>,
    /// Optimistic concurrency token, bumped on every workflow mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the project-creation collaborator
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub lifecycle_type: LifecycleType,
    pub created_by_id: Uuid,
    pub organization_id: Option<Uuid>,
}

impl NewProject {
    pub fn into_project(self, now: DateTime<Utc>) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: self.name,
            lifecycle_type: self.lifecycle_type,
            status: ProjectStatus::Draft,
            current_stage: String::new(),
            created_by_id: self.created_by_id,
            organization_id: self.organization_id,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Per-project instance of a registry stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: Uuid,
    pub project_id: Uuid,
    pub step_name: String,
    pub step_order: u32,
    pub status: StepStatus,
    pub required_role: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub category: String,
}

/// Grant edge between a role and a permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub permission_name: String,
    pub granted: bool,
}

/// One entry of a replace-by-role grant submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub permission_id: Uuid,
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventType {
    WorkflowAdvanced,
    WorkflowMovedBack,
    ProjectCompleted,
}

impl LifecycleEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventType::WorkflowAdvanced => "WORKFLOW_ADVANCED",
            LifecycleEventType::WorkflowMovedBack => "WORKFLOW_MOVED_BACK",
            LifecycleEventType::ProjectCompleted => "PROJECT_COMPLETED",
        }
    }
}

impl FromStr for LifecycleEventType {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WORKFLOW_ADVANCED" => Ok(LifecycleEventType::WorkflowAdvanced),
            "WORKFLOW_MOVED_BACK" => Ok(LifecycleEventType::WorkflowMovedBack),
            "PROJECT_COMPLETED" => Ok(LifecycleEventType::ProjectCompleted),
            _ => Err(UnknownCode {
                kind: "lifecycle event type",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle event written to the outbox alongside a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub project_id: Uuid,
    pub event_type: LifecycleEventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Processed,
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Claimed => "CLAIMED",
            OutboxStatus::Processed => "PROCESSED",
            OutboxStatus::DeadLetter => "DEAD_LETTER",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "CLAIMED" => Ok(OutboxStatus::Claimed),
            "PROCESSED" => Ok(OutboxStatus::Processed),
            "DEAD_LETTER" => Ok(OutboxStatus::DeadLetter),
            _ => Err(UnknownCode {
                kind: "outbox status",
                value: s.to_string(),
            }),
        }
    }
}

/// Durable outbox row wrapping a lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub seq: i64,
    pub event: LifecycleEvent,
    pub status: OutboxStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}
