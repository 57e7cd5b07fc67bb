// Workflow engine - loads a snapshot, checks it, plans, commits
//
// The engine holds no per-project state. Serialization of concurrent
// transitions is delegated to the store's version check, so a lost race
// surfaces as `WorkflowError::Conflict` and is never retried here.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::errors::{WorkflowError, WorkflowResult};
use super::transition::{self, ProjectWorkflow, TransitionCheck, TransitionKind, TransitionPlan};
use crate::auth::{stage_owner_decision, Caller, OwnershipPolicy};
use crate::domain::{LifecycleType, NewProject, Project, ProjectStatus, WorkflowStep};
use crate::observability::{workflow_metrics, OperationTimer};
use crate::store::WorkflowStore;
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// Project snapshot returned by every transition and status query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub project: Project,
    pub current_step: Option<WorkflowStep>,
    pub stages: Vec<WorkflowStep>,
}

impl From<ProjectWorkflow> for WorkflowStatus {
    fn from(workflow: ProjectWorkflow) -> Self {
        let current_step = workflow.current_step().cloned();
        Self {
            project: workflow.project,
            current_step,
            stages: workflow.steps,
        }
    }
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    ownership: OwnershipPolicy,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, ownership: OwnershipPolicy) -> Self {
        Self { store, ownership }
    }

    pub fn ownership_policy(&self) -> OwnershipPolicy {
        self.ownership
    }

    /// Insert a project and create its step set in one call
    pub async fn create_project(&self, new_project: NewProject) -> WorkflowResult<WorkflowStatus> {
        if new_project.name.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "project name must not be empty".to_string(),
            ));
        }
        let lifecycle = new_project.lifecycle_type;
        let project = new_project.into_project(Utc::now());
        self.store.insert_project(&project).await?;
        info!(project_id = %project.id, lifecycle = %lifecycle, "Created project");
        self.initialize(project.id, lifecycle).await
    }

    /// Create one step per registry stage with the first one active.
    ///
    /// Rejected with `Conflict` if the project already has steps.
    pub async fn initialize(
        &self,
        project_id: Uuid,
        lifecycle_type: LifecycleType,
    ) -> WorkflowResult<WorkflowStatus> {
        let snapshot = self.store.load_workflow(project_id).await?;
        if snapshot.project.lifecycle_type != lifecycle_type {
            return Err(WorkflowError::InvalidRequest(format!(
                "project {project_id} is a {} project, not {lifecycle_type}",
                snapshot.project.lifecycle_type
            )));
        }
        let steps = transition::initial_steps(&snapshot.project);
        let project = self.store.initialize_steps(project_id, &steps).await?;
        info!(
            project_id = %project_id,
            lifecycle = %lifecycle_type,
            steps = steps.len(),
            "Initialized workflow"
        );
        Ok(ProjectWorkflow::new(project, steps).into())
    }

    pub async fn current_step(&self, project_id: Uuid) -> WorkflowResult<Option<WorkflowStep>> {
        let workflow = self.store.load_workflow(project_id).await?;
        Ok(workflow.current_step().cloned())
    }

    /// Whether the project could advance; does not consider the caller
    pub async fn can_advance(&self, project_id: Uuid) -> WorkflowResult<TransitionCheck> {
        let workflow = self.store.load_workflow(project_id).await?;
        Ok(transition::check_advance(&workflow))
    }

    pub async fn can_move_back(&self, project_id: Uuid) -> WorkflowResult<TransitionCheck> {
        let workflow = self.store.load_workflow(project_id).await?;
        Ok(transition::check_move_back(&workflow))
    }

    pub async fn status(&self, project_id: Uuid) -> WorkflowResult<WorkflowStatus> {
        Ok(self.store.load_workflow(project_id).await?.into())
    }

    pub async fn advance(
        &self,
        project_id: Uuid,
        caller: &Caller,
        comment: Option<&str>,
    ) -> WorkflowResult<WorkflowStatus> {
        self.transition(TransitionKind::Advance, project_id, caller, comment)
            .await
    }

    pub async fn move_back(
        &self,
        project_id: Uuid,
        caller: &Caller,
        comment: Option<&str>,
    ) -> WorkflowResult<WorkflowStatus> {
        self.transition(TransitionKind::MoveBack, project_id, caller, comment)
            .await
    }

    async fn transition(
        &self,
        kind: TransitionKind,
        project_id: Uuid,
        caller: &Caller,
        comment: Option<&str>,
    ) -> WorkflowResult<WorkflowStatus> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            kind.audit_action(),
            project_id,
            caller.user_id,
            &correlation_id,
        );

        async move {
            let timer = OperationTimer::new(kind.audit_action());
            let result = self.run_transition(kind, project_id, caller, comment).await;
            timer.finish();

            let metrics = workflow_metrics();
            match &result {
                Ok(status) => match kind {
                    TransitionKind::Advance => {
                        metrics.record_advance(status.project.status == ProjectStatus::Completed)
                    }
                    TransitionKind::MoveBack => metrics.record_move_back(),
                },
                Err(err) if err.is_conflict() => metrics.record_conflict(),
                Err(WorkflowError::InvalidTransition { reason }) => {
                    metrics.record_invalid_transition();
                    info!(reason = %reason, "Transition rejected");
                }
                Err(err) => warn!(error = %err, "Transition failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_transition(
        &self,
        kind: TransitionKind,
        project_id: Uuid,
        caller: &Caller,
        comment: Option<&str>,
    ) -> WorkflowResult<WorkflowStatus> {
        let mut workflow = self.store.load_workflow(project_id).await?;

        // Ownership is judged against the same snapshot the plan is built from
        if let Some(step) = owning_step(kind, &workflow) {
            stage_owner_decision(self.ownership, caller, step).into_result()?;
        }

        let plan = self.plan(kind, &workflow, caller, comment)?;
        self.store.commit_transition(&plan).await?;
        workflow.apply(&plan);

        info!(
            project_id = %project_id,
            from = %plan.from_stage,
            to = %plan.to_stage,
            version = workflow.project.version,
            "Workflow transition committed"
        );
        Ok(workflow.into())
    }

    fn plan(
        &self,
        kind: TransitionKind,
        workflow: &ProjectWorkflow,
        caller: &Caller,
        comment: Option<&str>,
    ) -> WorkflowResult<TransitionPlan> {
        let now = Utc::now();
        match kind {
            TransitionKind::Advance => transition::plan_advance(workflow, caller.user_id, comment, now),
            TransitionKind::MoveBack => {
                transition::plan_move_back(workflow, caller.user_id, comment, now)
            }
        }
    }
}

/// Step whose required role gates a transition.
///
/// Leaving the ownerless terminal step backwards re-enters the previous
/// stage, so its owner decides.
fn owning_step(kind: TransitionKind, workflow: &ProjectWorkflow) -> Option<&WorkflowStep> {
    let current = workflow.current_step()?;
    match (kind, current.required_role.as_deref()) {
        (TransitionKind::MoveBack, None) if current.step_order > 1 => workflow
            .step_at(current.step_order - 1)
            .or(Some(current)),
        _ => Some(current),
    }
}
