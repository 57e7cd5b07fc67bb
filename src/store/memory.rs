// In-process store used by tests and by `serve` when no database is configured.
//
// All state sits behind one lock, so each trait method is atomic with respect
// to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DirectoryStore, OutboxStore, PermissionStore, StoreError, StoreResult, WorkflowStore};
use crate::auth::Caller;
use crate::domain::{
    AuditLogEntry, Comment, OutboxEntry, OutboxStatus, Permission, PermissionGrant, Project, Role,
    RolePermission, User, WorkflowStep,
};
use crate::workflow::transition::{ProjectWorkflow, TransitionPlan};

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<Uuid, Project>,
    steps: HashMap<Uuid, Vec<WorkflowStep>>,
    audit: Vec<AuditLogEntry>,
    comments: Vec<Comment>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashMap<(Uuid, Uuid), bool>,
    users: HashMap<Uuid, User>,
    outbox: Vec<OutboxEntry>,
    next_seq: i64,
}

impl MemoryState {
    fn role_permissions(&self, role_id: Uuid) -> Vec<RolePermission> {
        let mut rows: Vec<RolePermission> = self
            .grants
            .iter()
            .filter(|((role, _), _)| *role == role_id)
            .filter_map(|((role, permission_id), granted)| {
                self.permissions.get(permission_id).map(|p| RolePermission {
                    role_id: *role,
                    permission_id: *permission_id,
                    permission_name: p.name.clone(),
                    granted: *granted,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.permission_name.cmp(&b.permission_name));
        rows
    }

    fn outbox_entry_mut(&mut self, event_id: Uuid) -> StoreResult<&mut OutboxEntry> {
        self.outbox
            .iter_mut()
            .find(|e| e.event.id == event_id)
            .ok_or_else(|| StoreError::not_found("outbox entry", event_id))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.projects.contains_key(&project.id) {
            return Err(StoreError::Duplicate {
                entity: "project",
                key: project.id.to_string(),
            });
        }
        state.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn initialize_steps(&self, project_id: Uuid, steps: &[WorkflowStep]) -> StoreResult<Project> {
        let mut state = self.state.write().await;
        if !state.projects.contains_key(&project_id) {
            return Err(StoreError::not_found("project", project_id));
        }
        if state.steps.get(&project_id).is_some_and(|s| !s.is_empty()) {
            return Err(StoreError::AlreadyInitialized { project_id });
        }
        let first_stage = steps
            .iter()
            .min_by_key(|s| s.step_order)
            .map(|s| s.step_name.clone())
            .unwrap_or_default();
        state.steps.insert(project_id, steps.to_vec());

        let project = state
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| StoreError::not_found("project", project_id))?;
        project.current_stage = first_stage;
        project.version += 1;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn load_workflow(&self, project_id: Uuid) -> StoreResult<ProjectWorkflow> {
        let state = self.state.read().await;
        let project = state
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", project_id))?;
        let steps = state.steps.get(&project_id).cloned().unwrap_or_default();
        Ok(ProjectWorkflow::new(project, steps))
    }

    async fn commit_transition(&self, plan: &TransitionPlan) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let project = state
            .projects
            .get_mut(&plan.project_id)
            .ok_or_else(|| StoreError::not_found("project", plan.project_id))?;
        if project.version != plan.expected_version {
            return Err(StoreError::VersionConflict {
                project_id: plan.project_id,
            });
        }
        let steps = state
            .steps
            .get_mut(&plan.project_id)
            .ok_or_else(|| StoreError::not_found("workflow steps", plan.project_id))?;
        if let Some(missing) = plan
            .steps
            .iter()
            .find(|u| !steps.iter().any(|s| s.id == u.step_id))
        {
            return Err(StoreError::not_found("workflow step", missing.step_id));
        }

        for update in &plan.steps {
            if let Some(step) = steps.iter_mut().find(|s| s.id == update.step_id) {
                step.status = update.status;
                step.completed_at = update.completed_at;
                step.completed_by = update.completed_by;
            }
        }
        project.status = plan.project.status;
        project.current_stage = plan.project.current_stage.clone();
        project.completed_at = plan.project.completed_at;
        project.updated_at = plan.project.updated_at;
        project.version += 1;

        state.audit.push(plan.audit.clone());
        if let Some(comment) = &plan.comment {
            state.comments.push(comment.clone());
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.outbox.push(OutboxEntry {
            seq,
            event: plan.event.clone(),
            status: OutboxStatus::Pending,
            attempt_count: 0,
            last_error: None,
            claimed_by: None,
            claimed_at: None,
            processed_at: None,
        });
        Ok(())
    }

    async fn audit_log(&self, project_id: Uuid) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn comments(&self, project_id: Uuid) -> StoreResult<Vec<Comment>> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn find_role(&self, role_id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn ensure_role(&self, name: &str, is_admin: bool) -> StoreResult<(Role, bool)> {
        let mut state = self.state.write().await;
        if let Some(role) = state.roles.values().find(|r| r.name == name) {
            return Ok((role.clone(), false));
        }
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_admin,
        };
        state.roles.insert(role.id, role.clone());
        Ok((role, true))
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
        Ok(permissions)
    }

    async fn ensure_permission(&self, name: &str, category: &str) -> StoreResult<(Permission, bool)> {
        let mut state = self.state.write().await;
        if let Some(permission) = state.permissions.values().find(|p| p.name == name) {
            return Ok((permission.clone(), false));
        }
        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.to_string(),
        };
        state.permissions.insert(permission.id, permission.clone());
        Ok((permission, true))
    }

    async fn is_granted(&self, role_id: Uuid, permission_name: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        let Some(permission) = state.permissions.values().find(|p| p.name == permission_name) else {
            return Ok(false);
        };
        Ok(state
            .grants
            .get(&(role_id, permission.id))
            .copied()
            .unwrap_or(false))
    }

    async fn role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<RolePermission>> {
        Ok(self.state.read().await.role_permissions(role_id))
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        grants: &[PermissionGrant],
    ) -> StoreResult<Vec<RolePermission>> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::not_found("role", role_id));
        }
        let mut seen = HashSet::with_capacity(grants.len());
        if let Some(dup) = grants.iter().find(|g| !seen.insert(g.permission_id)) {
            return Err(StoreError::Duplicate {
                entity: "permission grant",
                key: dup.permission_id.to_string(),
            });
        }
        if let Some(unknown) = grants
            .iter()
            .find(|g| !state.permissions.contains_key(&g.permission_id))
        {
            return Err(StoreError::not_found("permission", unknown.permission_id));
        }
        state.grants.retain(|(role, _), _| *role != role_id);
        for grant in grants {
            state
                .grants
                .insert((role_id, grant.permission_id), grant.granted);
        }
        Ok(state.role_permissions(role_id))
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&user.role_id) {
            return Err(StoreError::not_found("role", user.role_id));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate {
                entity: "user",
                key: user.email.clone(),
            });
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn resolve_caller(&self, user_id: Uuid) -> StoreResult<Option<Caller>> {
        let state = self.state.read().await;
        let Some(user) = state.users.get(&user_id) else {
            return Ok(None);
        };
        let role = state
            .roles
            .get(&user.role_id)
            .ok_or_else(|| StoreError::corrupt("user", format!("role {} missing", user.role_id)))?;
        Ok(Some(Caller::from_parts(user, role)))
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Option<OutboxEntry>> {
        let mut state = self.state.write().await;
        let Some(entry) = state
            .outbox
            .iter_mut()
            .filter(|e| matches!(e.status, OutboxStatus::Pending | OutboxStatus::Claimed))
            .min_by_key(|e| e.seq)
        else {
            return Ok(None);
        };
        let lease_live = entry.status == OutboxStatus::Claimed
            && entry.claimed_at.is_some_and(|at| at > stale_before);
        if lease_live {
            return Ok(None);
        }
        entry.status = OutboxStatus::Claimed;
        entry.claimed_by = Some(worker_id.to_string());
        entry.claimed_at = Some(Utc::now());
        entry.attempt_count += 1;
        Ok(Some(entry.clone()))
    }

    async fn mark_processed(&self, event_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entry = state.outbox_entry_mut(event_id)?;
        entry.status = OutboxStatus::Processed;
        entry.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entry = state.outbox_entry_mut(event_id)?;
        entry.status = OutboxStatus::Pending;
        entry.claimed_by = None;
        entry.claimed_at = None;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_dead_letter(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let entry = state.outbox_entry_mut(event_id)?;
        entry.status = OutboxStatus::DeadLetter;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn outbox_entries(&self, project_id: Uuid) -> StoreResult<Vec<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.event.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifecycleType, NewProject};
    use crate::workflow::transition::{initial_steps, plan_advance};

    async fn initialized(store: &MemoryStore) -> ProjectWorkflow {
        let project = NewProject {
            name: "Oat milk 1L".to_string(),
            lifecycle_type: LifecycleType::NewItem,
            created_by_id: Uuid::new_v4(),
            organization_id: None,
        }
        .into_project(Utc::now());
        store.insert_project(&project).await.unwrap();
        store
            .initialize_steps(project.id, &initial_steps(&project))
            .await
            .unwrap();
        store.load_workflow(project.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let store = MemoryStore::new();
        let workflow = initialized(&store).await;
        let err = store
            .initialize_steps(workflow.project.id, &initial_steps(&workflow.project))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyInitialized { .. }));
        assert_eq!(store.load_workflow(workflow.project.id).await.unwrap().steps.len(), 8);
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        let workflow = initialized(&store).await;
        let first = plan_advance(&workflow, Uuid::new_v4(), Some("one"), Utc::now()).unwrap();
        let second = plan_advance(&workflow, Uuid::new_v4(), Some("two"), Utc::now()).unwrap();

        store.commit_transition(&first).await.unwrap();
        let err = store.commit_transition(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let project_id = workflow.project.id;
        assert_eq!(store.audit_log(project_id).await.unwrap().len(), 1);
        assert_eq!(store.comments(project_id).await.unwrap().len(), 1);
        assert_eq!(store.outbox_entries(project_id).await.unwrap().len(), 1);
        let reloaded = store.load_workflow(project_id).await.unwrap();
        assert_eq!(reloaded.project.current_stage, "Freight Strategy");
    }

    #[tokio::test]
    async fn test_grant_replacement_is_total() {
        let store = MemoryStore::new();
        let (role, _) = store.ensure_role("Logistics", false).await.unwrap();
        let (advance, _) = store.ensure_permission("ADVANCE_WORKFLOW", "Workflow").await.unwrap();
        let (view, _) = store.ensure_permission("VIEW_PROJECT", "Projects").await.unwrap();

        store
            .replace_role_permissions(
                role.id,
                &[
                    PermissionGrant { permission_id: advance.id, granted: true },
                    PermissionGrant { permission_id: view.id, granted: true },
                ],
            )
            .await
            .unwrap();
        let rows = store
            .replace_role_permissions(
                role.id,
                &[PermissionGrant { permission_id: view.id, granted: false }],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(!store.is_granted(role.id, "ADVANCE_WORKFLOW").await.unwrap());
        assert!(!store.is_granted(role.id, "VIEW_PROJECT").await.unwrap());
        assert!(!store.is_granted(role.id, "NO_SUCH_PERMISSION").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_permission_leaves_grants_untouched() {
        let store = MemoryStore::new();
        let (role, _) = store.ensure_role("Supplier", false).await.unwrap();
        let (advance, _) = store.ensure_permission("ADVANCE_WORKFLOW", "Workflow").await.unwrap();
        store
            .replace_role_permissions(
                role.id,
                &[PermissionGrant { permission_id: advance.id, granted: true }],
            )
            .await
            .unwrap();

        let err = store
            .replace_role_permissions(
                role.id,
                &[PermissionGrant { permission_id: Uuid::new_v4(), granted: true }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "permission", .. }));
        assert!(store.is_granted(role.id, "ADVANCE_WORKFLOW").await.unwrap());
    }

    fn live_claims() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(30)
    }

    #[tokio::test]
    async fn test_outbox_claim_cycle() {
        let store = MemoryStore::new();
        let workflow = initialized(&store).await;
        let plan = plan_advance(&workflow, Uuid::new_v4(), None, Utc::now()).unwrap();
        store.commit_transition(&plan).await.unwrap();

        let claimed = store.claim_next("worker-a", live_claims()).await.unwrap().unwrap();
        assert_eq!(claimed.attempt_count, 1);
        assert!(claimed.claimed_at.is_some());
        assert!(store.claim_next("worker-b", live_claims()).await.unwrap().is_none());

        store.record_failure(claimed.event.id, "sink offline").await.unwrap();
        let retried = store.claim_next("worker-b", live_claims()).await.unwrap().unwrap();
        assert_eq!(retried.attempt_count, 2);

        store.mark_processed(retried.event.id).await.unwrap();
        let entries = store.outbox_entries(workflow.project.id).await.unwrap();
        assert_eq!(entries[0].status, OutboxStatus::Processed);
        assert_eq!(entries[0].last_error.as_deref(), Some("sink offline"));
    }

    #[tokio::test]
    async fn test_expired_claim_is_taken_over_before_later_entries() {
        let store = MemoryStore::new();
        let mut workflow = initialized(&store).await;
        let first = plan_advance(&workflow, Uuid::new_v4(), None, Utc::now()).unwrap();
        store.commit_transition(&first).await.unwrap();
        workflow.apply(&first);
        let second = plan_advance(&workflow, Uuid::new_v4(), None, Utc::now()).unwrap();
        store.commit_transition(&second).await.unwrap();

        let abandoned = store.claim_next("worker-a", live_claims()).await.unwrap().unwrap();
        assert_eq!(abandoned.event.id, first.event.id);
        // The held claim blocks the queue rather than letting the second event past
        assert!(store.claim_next("worker-b", live_claims()).await.unwrap().is_none());

        let taken_over = store.claim_next("worker-b", Utc::now()).await.unwrap().unwrap();
        assert_eq!(taken_over.event.id, first.event.id);
        assert_eq!(taken_over.claimed_by.as_deref(), Some("worker-b"));
        assert_eq!(taken_over.attempt_count, 2);
    }
}
