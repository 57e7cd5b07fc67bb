// Transition planning - pure functions from a loaded snapshot to a commit plan
//
// Nothing in this module touches storage. A plan carries the project version
// it was computed from; the store refuses to apply it if that version moved.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::errors::{WorkflowError, WorkflowResult};
use super::stages;
use crate::domain::{
    AuditLogEntry, Comment, LifecycleEvent, LifecycleEventType, Project, ProjectStatus,
    StepStatus, WorkflowStep,
};

pub const ADVANCE_WORKFLOW_ACTION: &str = "ADVANCE_WORKFLOW";
pub const MOVE_BACK_WORKFLOW_ACTION: &str = "MOVE_BACK_WORKFLOW";
pub const AUDIT_ENTITY_PROJECT: &str = "Project";

/// A project together with its step rows ordered by `step_order`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectWorkflow {
    pub project: Project,
    pub steps: Vec<WorkflowStep>,
}

impl ProjectWorkflow {
    pub fn new(project: Project, mut steps: Vec<WorkflowStep>) -> Self {
        steps.sort_by_key(|s| s.step_order);
        Self { project, steps }
    }

    /// The IN_PROGRESS step; lowest order wins if the rows disagree.
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .min_by_key(|s| s.step_order)
    }

    pub fn step_at(&self, order: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_order == order)
    }

    /// Apply a committed plan to this in-memory copy
    pub fn apply(&mut self, plan: &TransitionPlan) {
        let project = &mut self.project;
        project.status = plan.project.status;
        project.current_stage = plan.project.current_stage.clone();
        project.completed_at = plan.project.completed_at;
        project.updated_at = plan.project.updated_at;
        project.version = plan.expected_version + 1;

        for update in &plan.steps {
            if let Some(step) = self.steps.iter_mut().find(|s| s.id == update.step_id) {
                step.status = update.status;
                step.completed_at = update.completed_at;
                step.completed_by = update.completed_by;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    Advance,
    MoveBack,
}

impl TransitionKind {
    pub fn audit_action(&self) -> &'static str {
        match self {
            TransitionKind::Advance => ADVANCE_WORKFLOW_ACTION,
            TransitionKind::MoveBack => MOVE_BACK_WORKFLOW_ACTION,
        }
    }
}

/// Outcome of a can-advance / can-move-back query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub reason: String,
}

impl TransitionCheck {
    fn allow(reason: String) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub step_id: Uuid,
    pub status: StepStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectUpdate {
    pub status: ProjectStatus,
    pub current_stage: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a single transition writes, applied atomically by the store
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub project_id: Uuid,
    pub kind: TransitionKind,
    pub expected_version: i64,
    pub from_stage: String,
    pub to_stage: String,
    pub project: ProjectUpdate,
    pub steps: Vec<StepUpdate>,
    pub audit: AuditLogEntry,
    pub comment: Option<Comment>,
    pub event: LifecycleEvent,
}

const NO_ACTIVE_STEP: &str = "No active workflow step";
const AT_FINAL_STAGE: &str = "Workflow is already at its final stage";
const AT_FIRST_STAGE: &str = "Cannot move back from the first stage";

pub fn check_advance(workflow: &ProjectWorkflow) -> TransitionCheck {
    let Some(current) = workflow.current_step() else {
        return TransitionCheck::deny(NO_ACTIVE_STEP);
    };
    let lifecycle = workflow.project.lifecycle_type;
    if current.step_order >= stages::stage_count(lifecycle) {
        return TransitionCheck::deny(AT_FINAL_STAGE);
    }
    match stages::stage_at(lifecycle, current.step_order + 1) {
        Some(next) => TransitionCheck::allow(format!("Can advance to {}", next.name)),
        None => TransitionCheck::deny(AT_FINAL_STAGE),
    }
}

pub fn check_move_back(workflow: &ProjectWorkflow) -> TransitionCheck {
    let Some(current) = workflow.current_step() else {
        return TransitionCheck::deny(NO_ACTIVE_STEP);
    };
    if current.step_order <= 1 {
        return TransitionCheck::deny(AT_FIRST_STAGE);
    }
    match stages::stage_at(workflow.project.lifecycle_type, current.step_order - 1) {
        Some(previous) => TransitionCheck::allow(format!("Can move back to {}", previous.name)),
        None => TransitionCheck::deny(AT_FIRST_STAGE),
    }
}

fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn missing_step(project_id: Uuid, order: u32) -> WorkflowError {
    WorkflowError::NotFound {
        entity: "workflow step",
        id: format!("{project_id}#{order}"),
    }
}

/// Plan an advance from the current step to `order + 1`
pub fn plan_advance(
    workflow: &ProjectWorkflow,
    actor_id: Uuid,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> WorkflowResult<TransitionPlan> {
    let check = check_advance(workflow);
    if !check.allowed {
        return Err(WorkflowError::invalid_transition(check.reason));
    }
    let project = &workflow.project;
    let current = workflow
        .current_step()
        .ok_or_else(|| WorkflowError::invalid_transition(NO_ACTIVE_STEP))?;
    let next = workflow
        .step_at(current.step_order + 1)
        .ok_or_else(|| missing_step(project.id, current.step_order + 1))?;

    let reaches_terminal = stages::is_terminal(project.lifecycle_type, next.step_order);
    let (status, completed_at) = if reaches_terminal {
        (ProjectStatus::Completed, Some(now))
    } else {
        (ProjectStatus::InProgress, None)
    };

    let steps = vec![
        StepUpdate {
            step_id: current.id,
            status: StepStatus::Completed,
            completed_at: Some(now),
            completed_by: Some(actor_id),
        },
        StepUpdate {
            step_id: next.id,
            status: StepStatus::InProgress,
            completed_at: None,
            completed_by: None,
        },
    ];
    let event_type = if reaches_terminal {
        LifecycleEventType::ProjectCompleted
    } else {
        LifecycleEventType::WorkflowAdvanced
    };

    Ok(build_plan(
        workflow,
        TransitionKind::Advance,
        current,
        next,
        ProjectUpdate {
            status,
            current_stage: next.step_name.clone(),
            completed_at,
            updated_at: now,
        },
        steps,
        event_type,
        actor_id,
        normalize_comment(comment),
        now,
    ))
}

/// Plan a move back from the current step to `order - 1`
pub fn plan_move_back(
    workflow: &ProjectWorkflow,
    actor_id: Uuid,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> WorkflowResult<TransitionPlan> {
    let check = check_move_back(workflow);
    if !check.allowed {
        return Err(WorkflowError::invalid_transition(check.reason));
    }
    let project = &workflow.project;
    let current = workflow
        .current_step()
        .ok_or_else(|| WorkflowError::invalid_transition(NO_ACTIVE_STEP))?;
    let previous = workflow
        .step_at(current.step_order - 1)
        .ok_or_else(|| missing_step(project.id, current.step_order - 1))?;

    let steps = vec![
        StepUpdate {
            step_id: current.id,
            status: StepStatus::Pending,
            completed_at: None,
            completed_by: None,
        },
        StepUpdate {
            step_id: previous.id,
            status: StepStatus::InProgress,
            completed_at: None,
            completed_by: None,
        },
    ];

    Ok(build_plan(
        workflow,
        TransitionKind::MoveBack,
        current,
        previous,
        ProjectUpdate {
            status: ProjectStatus::InProgress,
            current_stage: previous.step_name.clone(),
            completed_at: None,
            updated_at: now,
        },
        steps,
        LifecycleEventType::WorkflowMovedBack,
        actor_id,
        normalize_comment(comment),
        now,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_plan(
    workflow: &ProjectWorkflow,
    kind: TransitionKind,
    from: &WorkflowStep,
    to: &WorkflowStep,
    project_update: ProjectUpdate,
    steps: Vec<StepUpdate>,
    event_type: LifecycleEventType,
    actor_id: Uuid,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> TransitionPlan {
    let project = &workflow.project;

    let audit = AuditLogEntry {
        id: Uuid::new_v4(),
        project_id: project.id,
        user_id: actor_id,
        action: kind.audit_action().to_string(),
        entity_type: AUDIT_ENTITY_PROJECT.to_string(),
        entity_id: project.id,
        changes: json!({
            "from": from.step_name,
            "to": to.step_name,
            "comment": comment,
        }),
        created_at: now,
    };

    let comment = comment.map(|content| Comment {
        id: Uuid::new_v4(),
        project_id: project.id,
        user_id: actor_id,
        content,
        is_internal: true,
        created_at: now,
    });

    let event = LifecycleEvent {
        id: Uuid::new_v4(),
        project_id: project.id,
        event_type,
        payload: json!({
            "lifecycleType": project.lifecycle_type,
            "from": from.step_name,
            "fromOrder": from.step_order,
            "to": to.step_name,
            "toOrder": to.step_order,
            "status": project_update.status,
            "actorId": actor_id,
        }),
        created_at: now,
    };

    TransitionPlan {
        project_id: project.id,
        kind,
        expected_version: project.version,
        from_stage: from.step_name.clone(),
        to_stage: to.step_name.clone(),
        project: project_update,
        steps,
        audit,
        comment,
        event,
    }
}

/// Fresh step rows for a project, first stage active
pub fn initial_steps(project: &Project) -> Vec<WorkflowStep> {
    stages::stages_for(project.lifecycle_type)
        .iter()
        .map(|stage| WorkflowStep {
            id: Uuid::new_v4(),
            project_id: project.id,
            step_name: stage.name.to_string(),
            step_order: stage.order,
            status: if stage.order == 1 {
                StepStatus::InProgress
            } else {
                StepStatus::Pending
            },
            required_role: stage.required_role.map(str::to_string),
            completed_at: None,
            completed_by: None,
        })
        .collect()
}
