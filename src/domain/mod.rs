// Domain model shared by the workflow engine, authorization gate and stores

pub mod types;

pub use types::{
    AuditLogEntry, Comment, LifecycleEvent, LifecycleEventType, LifecycleType, NewProject,
    OutboxEntry, OutboxStatus, Permission, PermissionGrant, Project, ProjectStatus, Role,
    RolePermission, StepStatus, UnknownCode, User, WorkflowStep,
};
