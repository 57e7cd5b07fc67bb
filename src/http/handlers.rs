//! Request handlers. Each one authorizes through the gate before touching
//! the engine or the stores.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::auth::{permissions, Caller};
use crate::domain::{
    AuditLogEntry, LifecycleType, NewProject, Permission, PermissionGrant, RolePermission,
};
use crate::workflow::{transition, WorkflowError, WorkflowStatus};

#[derive(Debug, Default, Deserialize)]
pub struct TransitionBody {
    pub comment: Option<String>,
}

impl TransitionBody {
    /// An empty body means no comment; anything else must be a JSON object.
    pub fn parse(headers: &HeaderMap, body: &Bytes) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if !is_json {
            return Err(ApiError::BadRequest(
                "transition body must be sent as application/json".to_string(),
            ));
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid transition body: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    pub name: String,
    pub lifecycle_type: String,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReplacePermissionsBody {
    pub permissions: Vec<PermissionGrant>,
}

/// Workflow status plus whether each transition is currently possible
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    #[serde(flatten)]
    pub status: WorkflowStatus,
    pub can_advance: bool,
    pub can_advance_reason: String,
    pub can_move_back: bool,
    pub can_move_back_reason: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_project(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateProjectBody>,
) -> Result<(StatusCode, Json<WorkflowStatus>), ApiError> {
    state.gate.require(&caller, permissions::CREATE_PROJECT).await?;

    let lifecycle_type = LifecycleType::resolve(&body.lifecycle_type, state.strict_lifecycle_types)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let status = state
        .engine
        .create_project(NewProject {
            name: body.name,
            lifecycle_type,
            created_by_id: caller.user_id,
            organization_id: body.organization_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(status)))
}

pub async fn advance(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WorkflowStatus>, ApiError> {
    state.gate.require(&caller, permissions::ADVANCE_WORKFLOW).await?;
    let body = TransitionBody::parse(&headers, &body)?;
    let status = state
        .engine
        .advance(project_id, &caller, body.comment.as_deref())
        .await?;
    Ok(Json(status))
}

pub async fn move_back(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WorkflowStatus>, ApiError> {
    state.gate.require(&caller, permissions::MOVE_BACK_WORKFLOW).await?;
    let body = TransitionBody::parse(&headers, &body)?;
    let status = state
        .engine
        .move_back(project_id, &caller, body.comment.as_deref())
        .await?;
    Ok(Json(status))
}

pub async fn workflow(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<WorkflowView>, ApiError> {
    state
        .gate
        .require_any(&caller, &permissions::VIEW_WORKFLOW)
        .await?;

    // Both checks and the status come from one snapshot
    let snapshot = state.workflows.load_workflow(project_id).await?;
    let advance = transition::check_advance(&snapshot);
    let back = transition::check_move_back(&snapshot);
    Ok(Json(WorkflowView {
        status: snapshot.into(),
        can_advance: advance.allowed,
        can_advance_reason: advance.reason,
        can_move_back: back.allowed,
        can_move_back_reason: back.reason,
    }))
}

pub async fn audit_log(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    state.gate.require(&caller, permissions::VIEW_AUDIT_LOG).await?;
    // 404 for unknown projects rather than an empty list
    state.workflows.load_workflow(project_id).await?;
    Ok(Json(state.workflows.audit_log(project_id).await?))
}

pub async fn list_permissions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    state.gate.require(&caller, permissions::MANAGE_PERMISSIONS).await?;
    Ok(Json(state.permissions.list_permissions().await?))
}

pub async fn role_permissions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(role_id): Path<Uuid>,
) -> Result<Json<Vec<RolePermission>>, ApiError> {
    state.gate.require(&caller, permissions::MANAGE_PERMISSIONS).await?;
    if state.permissions.find_role(role_id).await?.is_none() {
        return Err(WorkflowError::NotFound {
            entity: "role",
            id: role_id.to_string(),
        }
        .into());
    }
    Ok(Json(state.permissions.role_permissions(role_id).await?))
}

pub async fn replace_role_permissions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<ReplacePermissionsBody>,
) -> Result<Json<Vec<RolePermission>>, ApiError> {
    state.gate.require(&caller, permissions::MANAGE_PERMISSIONS).await?;

    let mut seen = HashSet::with_capacity(body.permissions.len());
    if let Some(dup) = body.permissions.iter().find(|g| !seen.insert(g.permission_id)) {
        return Err(ApiError::BadRequest(format!(
            "permission {} listed more than once",
            dup.permission_id
        )));
    }

    let grants = state
        .permissions
        .replace_role_permissions(role_id, &body.permissions)
        .await?;
    tracing::info!(
        role_id = %role_id,
        actor = %caller.user_id,
        grants = grants.len(),
        "Replaced role permissions"
    );
    Ok(Json(grants))
}
