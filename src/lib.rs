// Item Lifecycle Library - workflow state machine and role-permission gate
// This exposes the core components for the binary and integration tests

pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod domain;
pub mod http;
pub mod observability;
pub mod outbox;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use auth::{AuthorizationGate, Caller, Decision, OwnershipPolicy};
pub use config::{config, ItemLifecycleConfig};
pub use domain::{LifecycleType, Project, ProjectStatus, StepStatus, WorkflowStep};
pub use http::{build_router, ApiError, AppState};
pub use observability::{workflow_metrics, OperationTimer, TransitionMetrics};
pub use shutdown::ShutdownCoordinator;
pub use store::{MemoryStore, StoreError};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflow::{WorkflowEngine, WorkflowError, WorkflowStatus};
