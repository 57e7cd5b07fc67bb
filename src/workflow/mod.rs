// Workflow State Machine: stage registry, transition planning and the engine

pub mod engine;
pub mod errors;
pub mod stages;
pub mod transition;

pub use engine::{WorkflowEngine, WorkflowStatus};
pub use errors::{WorkflowError, WorkflowResult};
pub use stages::{stages_for, stages_for_name, StageDefinition};
pub use transition::{ProjectWorkflow, TransitionCheck, TransitionKind, TransitionPlan};
