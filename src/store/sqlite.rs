// SQLite-backed store
//
// Transitions are serialized per project by the `version` column: the commit
// transaction opens with a version-guarded UPDATE, so it takes the write lock
// first and a stale plan touches nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use super::{DirectoryStore, OutboxStore, PermissionStore, StoreError, StoreResult, WorkflowStore};
use crate::auth::Caller;
use crate::domain::{
    AuditLogEntry, Comment, LifecycleEvent, OutboxEntry, OutboxStatus, Permission,
    PermissionGrant, Project, Role, RolePermission, User, WorkflowStep,
};
use crate::workflow::transition::{ProjectWorkflow, TransitionPlan};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn uuid_col(row: &SqliteRow, column: &str) -> StoreResult<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::corrupt("uuid", format!("{column}: {e}")))
}

fn opt_uuid_col(row: &SqliteRow, column: &str) -> StoreResult<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Uuid::parse_str(&value).map_err(|e| StoreError::corrupt("uuid", format!("{column}: {e}")))
    })
    .transpose()
}

fn json_col(row: &SqliteRow, column: &str) -> StoreResult<serde_json::Value> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

const PROJECT_COLUMNS: &str = "id, name, lifecycle_type, status, current_stage, created_by_id, \
     organization_id, version, created_at, updated_at, completed_at";

fn project_from_row(row: &SqliteRow) -> StoreResult<Project> {
    let lifecycle: String = row.try_get("lifecycle_type")?;
    let status: String = row.try_get("status")?;
    Ok(Project {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        lifecycle_type: lifecycle.parse()?,
        status: status.parse()?,
        current_stage: row.try_get("current_stage")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        organization_id: opt_uuid_col(row, "organization_id")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn step_from_row(row: &SqliteRow) -> StoreResult<WorkflowStep> {
    let status: String = row.try_get("status")?;
    let order: i64 = row.try_get("step_order")?;
    Ok(WorkflowStep {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        step_name: row.try_get("step_name")?,
        step_order: u32::try_from(order)
            .map_err(|_| StoreError::corrupt("workflow step", format!("step_order {order}")))?,
        status: status.parse()?,
        required_role: row.try_get("required_role")?,
        completed_at: row.try_get("completed_at")?,
        completed_by: opt_uuid_col(row, "completed_by")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        user_id: uuid_col(row, "user_id")?,
        action: row.try_get("action")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: uuid_col(row, "entity_id")?,
        changes: json_col(row, "changes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> StoreResult<Comment> {
    Ok(Comment {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        user_id: uuid_col(row, "user_id")?,
        content: row.try_get("content")?,
        is_internal: row.try_get("is_internal")?,
        created_at: row.try_get("created_at")?,
    })
}

const OUTBOX_COLUMNS: &str = "seq, id, project_id, event_type, payload, status, attempt_count, \
     last_error, claimed_by, claimed_at, created_at, processed_at";

fn outbox_from_row(row: &SqliteRow) -> StoreResult<OutboxEntry> {
    let event_type: String = row.try_get("event_type")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempt_count")?;
    Ok(OutboxEntry {
        seq: row.try_get("seq")?,
        event: LifecycleEvent {
            id: uuid_col(row, "id")?,
            project_id: uuid_col(row, "project_id")?,
            event_type: event_type.parse()?,
            payload: json_col(row, "payload")?,
            created_at: row.try_get("created_at")?,
        },
        status: status.parse()?,
        attempt_count: attempts.max(0) as u32,
        last_error: row.try_get("last_error")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: row.try_get("claimed_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn role_from_row(row: &SqliteRow) -> StoreResult<Role> {
    Ok(Role {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        is_admin: row.try_get("is_admin")?,
    })
}

fn permission_from_row(row: &SqliteRow) -> StoreResult<Permission> {
    Ok(Permission {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
    })
}

const ROLE_PERMISSIONS_QUERY: &str = r#"
    SELECT rp.role_id, rp.permission_id, p.name AS permission_name, rp.granted
    FROM role_permissions rp
    JOIN permissions p ON p.id = rp.permission_id
    WHERE rp.role_id = ?1
    ORDER BY p.name
"#;

fn role_permission_from_row(row: &SqliteRow) -> StoreResult<RolePermission> {
    Ok(RolePermission {
        role_id: uuid_col(row, "role_id")?,
        permission_id: uuid_col(row, "permission_id")?,
        permission_name: row.try_get("permission_name")?,
        granted: row.try_get("granted")?,
    })
}

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, lifecycle_type, status, current_stage, created_by_id,
                                  organization_id, version, created_at, updated_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(project.lifecycle_type.as_str())
        .bind(project.status.as_str())
        .bind(&project.current_stage)
        .bind(project.created_by_id.to_string())
        .bind(project.organization_id.map(|id| id.to_string()))
        .bind(project.version)
        .bind(project.created_at)
        .bind(project.updated_at)
        .bind(project.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn initialize_steps(&self, project_id: Uuid, steps: &[WorkflowStep]) -> StoreResult<Project> {
        let first_stage = steps
            .iter()
            .min_by_key(|s| s.step_order)
            .map(|s| s.step_name.clone())
            .unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the lock before it reads
        let touched = sqlx::query(
            "UPDATE projects SET current_stage = ?1, version = version + 1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&first_stage)
        .bind(Utc::now())
        .bind(project_id.to_string())
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::not_found("project", project_id));
        }

        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM workflow_steps WHERE project_id = ?1")
            .bind(project_id.to_string())
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;
        if existing > 0 {
            return Err(StoreError::AlreadyInitialized { project_id });
        }

        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (id, project_id, step_name, step_order, status,
                                            required_role, completed_at, completed_by)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(step.id.to_string())
            .bind(project_id.to_string())
            .bind(&step.step_name)
            .bind(i64::from(step.step_order))
            .bind(step.status.as_str())
            .bind(step.required_role.as_deref())
            .bind(step.completed_at)
            .bind(step.completed_by.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))
            .bind(project_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let project = project_from_row(&row)?;
        tx.commit().await?;

        debug!(project_id = %project_id, steps = steps.len(), "Workflow steps initialized");
        Ok(project)
    }

    async fn load_workflow(&self, project_id: Uuid) -> StoreResult<ProjectWorkflow> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("project", project_id))?;
        let project = project_from_row(&row)?;

        let rows = sqlx::query(
            r#"
            SELECT id, project_id, step_name, step_order, status, required_role, completed_at, completed_by
            FROM workflow_steps
            WHERE project_id = ?1
            ORDER BY step_order ASC
            "#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let steps = rows.iter().map(step_from_row).collect::<StoreResult<Vec<_>>>()?;

        Ok(ProjectWorkflow::new(project, steps))
    }

    async fn commit_transition(&self, plan: &TransitionPlan) -> StoreResult<()> {
        let project_id = plan.project_id.to_string();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE projects
            SET status = ?1, current_stage = ?2, completed_at = ?3, updated_at = ?4, version = version + 1
            WHERE id = ?5 AND version = ?6
            "#,
        )
        .bind(plan.project.status.as_str())
        .bind(&plan.project.current_stage)
        .bind(plan.project.completed_at)
        .bind(plan.project.updated_at)
        .bind(&project_id)
        .bind(plan.expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM projects WHERE id = ?1")
                .bind(&project_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists {
                StoreError::VersionConflict {
                    project_id: plan.project_id,
                }
            } else {
                StoreError::not_found("project", plan.project_id)
            });
        }

        for update in &plan.steps {
            let result = sqlx::query(
                r#"
                UPDATE workflow_steps
                SET status = ?1, completed_at = ?2, completed_by = ?3
                WHERE id = ?4 AND project_id = ?5
                "#,
            )
            .bind(update.status.as_str())
            .bind(update.completed_at)
            .bind(update.completed_by.map(|id| id.to_string()))
            .bind(update.step_id.to_string())
            .bind(&project_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("workflow step", update.step_id));
            }
        }

        let audit = &plan.audit;
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, project_id, user_id, action, entity_type, entity_id, changes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(audit.id.to_string())
        .bind(audit.project_id.to_string())
        .bind(audit.user_id.to_string())
        .bind(&audit.action)
        .bind(&audit.entity_type)
        .bind(audit.entity_id.to_string())
        .bind(serde_json::to_string(&audit.changes)?)
        .bind(audit.created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(comment) = &plan.comment {
            sqlx::query(
                r#"
                INSERT INTO comments (id, project_id, user_id, content, is_internal, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(comment.id.to_string())
            .bind(comment.project_id.to_string())
            .bind(comment.user_id.to_string())
            .bind(&comment.content)
            .bind(comment.is_internal)
            .bind(comment.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let event = &plan.event;
        sqlx::query(
            r#"
            INSERT INTO lifecycle_outbox (id, project_id, event_type, payload, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.project_id.to_string())
        .bind(event.event_type.as_str())
        .bind(serde_json::to_string(&event.payload)?)
        .bind(OutboxStatus::Pending.as_str())
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn audit_log(&self, project_id: Uuid) -> StoreResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, user_id, action, entity_type, entity_id, changes, created_at
            FROM audit_logs
            WHERE project_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn comments(&self, project_id: Uuid) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, user_id, content, is_internal, created_at
            FROM comments
            WHERE project_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(comment_from_row).collect()
    }
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn find_role(&self, role_id: Uuid) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT id, name, is_admin FROM roles WHERE id = ?1")
            .bind(role_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT id, name, is_admin FROM roles WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn ensure_role(&self, name: &str, is_admin: bool) -> StoreResult<(Role, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO roles (id, name, is_admin) VALUES (?1, ?2, ?3) ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(is_admin)
        .execute(&self.pool)
        .await?;
        let role = self
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| StoreError::not_found("role", name))?;
        Ok((role, inserted.rows_affected() > 0))
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query("SELECT id, name, category FROM permissions ORDER BY category, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(permission_from_row).collect()
    }

    async fn ensure_permission(&self, name: &str, category: &str) -> StoreResult<(Permission, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO permissions (id, name, category) VALUES (?1, ?2, ?3) ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(category)
        .execute(&self.pool)
        .await?;
        let row = sqlx::query("SELECT id, name, category FROM permissions WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok((permission_from_row(&row)?, inserted.rows_affected() > 0))
    }

    async fn is_granted(&self, role_id: Uuid, permission_name: &str) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT rp.granted
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ?1 AND p.name = ?2
            "#,
        )
        .bind(role_id.to_string())
        .bind(permission_name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get::<bool, _>("granted")?),
            None => Ok(false),
        }
    }

    async fn role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<RolePermission>> {
        let rows = sqlx::query(ROLE_PERMISSIONS_QUERY)
            .bind(role_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(role_permission_from_row).collect()
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        grants: &[PermissionGrant],
    ) -> StoreResult<Vec<RolePermission>> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = grants.iter().find(|g| !seen.insert(g.permission_id)) {
            return Err(StoreError::Duplicate {
                entity: "permission grant",
                key: duplicate.permission_id.to_string(),
            });
        }

        let role_key = role_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?1")
            .bind(&role_key)
            .execute(&mut *tx)
            .await?;

        let role_exists = sqlx::query("SELECT 1 FROM roles WHERE id = ?1")
            .bind(&role_key)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !role_exists {
            return Err(StoreError::not_found("role", role_id));
        }

        for grant in grants {
            let permission_exists = sqlx::query("SELECT 1 FROM permissions WHERE id = ?1")
                .bind(grant.permission_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if !permission_exists {
                return Err(StoreError::not_found("permission", grant.permission_id));
            }
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id, granted) VALUES (?1, ?2, ?3)",
            )
            .bind(&role_key)
            .bind(grant.permission_id.to_string())
            .bind(grant.granted)
            .execute(&mut *tx)
            .await?;
        }

        let rows = sqlx::query(ROLE_PERMISSIONS_QUERY)
            .bind(&role_key)
            .fetch_all(&mut *tx)
            .await?;
        let replaced = rows
            .iter()
            .map(role_permission_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        tx.commit().await?;
        Ok(replaced)
    }
}

#[async_trait]
impl DirectoryStore for SqliteStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role_id)
            SELECT ?1, ?2, ?3, id FROM roles WHERE id = ?4
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role_id.to_string())
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::not_found("role", user.role_id));
        }
        Ok(())
    }

    async fn resolve_caller(&self, user_id: Uuid) -> StoreResult<Option<Caller>> {
        let row = sqlx::query(
            r#"
            SELECT u.id AS user_id, r.id AS role_id, r.name AS role_name, r.is_admin
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.id = ?1
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Caller {
            user_id: uuid_col(&row, "user_id")?,
            role_id: uuid_col(&row, "role_id")?,
            role_name: row.try_get("role_name")?,
            is_admin: row.try_get("is_admin")?,
        }))
    }
}

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Option<OutboxEntry>> {
        // Only the head of the queue is ever claimable; a live claim on it blocks the rest
        let row = sqlx::query(&format!(
            r#"
            UPDATE lifecycle_outbox
            SET status = ?1, claimed_by = ?2, claimed_at = ?3, attempt_count = attempt_count + 1
            WHERE seq = (
                SELECT seq FROM lifecycle_outbox
                WHERE status IN (?1, ?4)
                ORDER BY seq ASC LIMIT 1
            )
            AND (status = ?4 OR claimed_at IS NULL OR claimed_at <= ?5)
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(OutboxStatus::Claimed.as_str())
        .bind(worker_id)
        .bind(Utc::now())
        .bind(OutboxStatus::Pending.as_str())
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(outbox_from_row).transpose()
    }

    async fn mark_processed(&self, event_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE lifecycle_outbox SET status = ?1, processed_at = ?2 WHERE id = ?3",
        )
        .bind(OutboxStatus::Processed.as_str())
        .bind(Utc::now())
        .bind(event_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("outbox entry", event_id));
        }
        Ok(())
    }

    async fn record_failure(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE lifecycle_outbox SET status = ?1, claimed_by = NULL, claimed_at = NULL, last_error = ?2 WHERE id = ?3",
        )
        .bind(OutboxStatus::Pending.as_str())
        .bind(error)
        .bind(event_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("outbox entry", event_id));
        }
        Ok(())
    }

    async fn mark_dead_letter(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE lifecycle_outbox SET status = ?1, last_error = ?2 WHERE id = ?3",
        )
        .bind(OutboxStatus::DeadLetter.as_str())
        .bind(error)
        .bind(event_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("outbox entry", event_id));
        }
        Ok(())
    }

    async fn outbox_entries(&self, project_id: Uuid) -> StoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM lifecycle_outbox WHERE project_id = ?1 ORDER BY seq ASC"
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbox_from_row).collect()
    }
}
