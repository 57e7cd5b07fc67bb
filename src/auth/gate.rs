// Authorization Gate - the single place role grants are evaluated
//
// Grants are read from the permission store on every check. There is no
// cache, so an administrator's edit is visible to the very next request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::caller::Caller;
use crate::domain::WorkflowStep;
use crate::observability::workflow_metrics;
use crate::store::{PermissionStore, StoreError};
use crate::workflow::errors::{WorkflowError, WorkflowResult};

/// Result of an authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    /// Insufficient permission; names what would have satisfied the check
    Deny { required: Vec<String> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> WorkflowResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { required } => {
                workflow_metrics().record_denial();
                Err(WorkflowError::Forbidden { required })
            }
        }
    }
}

/// Whether transitions additionally require the caller to own the active stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Holding ADVANCE_WORKFLOW / MOVE_BACK_WORKFLOW is enough
    Coarse,
    /// The active step's required role must also match the caller's role
    #[default]
    StageOwner,
}

/// Stage-ownership decision for a transition out of `step`.
///
/// Admins and the ownerless terminal step always pass.
pub fn stage_owner_decision(policy: OwnershipPolicy, caller: &Caller, step: &WorkflowStep) -> Decision {
    if policy == OwnershipPolicy::Coarse || caller.is_admin {
        return Decision::Allow;
    }
    match step.required_role.as_deref() {
        None => Decision::Allow,
        Some(role) if role == caller.role_name => Decision::Allow,
        Some(role) => Decision::Deny {
            required: vec![format!("ROLE:{role}")],
        },
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn PermissionStore>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// Admins pass; everyone else needs an explicit `granted = true` row.
    pub async fn has_permission(&self, caller: &Caller, permission: &str) -> Result<bool, StoreError> {
        if caller.is_admin {
            return Ok(true);
        }
        let granted = self.store.is_granted(caller.role_id, permission).await?;
        debug!(
            user_id = %caller.user_id,
            role = %caller.role_name,
            permission = %permission,
            granted,
            "Permission check"
        );
        Ok(granted)
    }

    pub async fn has_any_permission(
        &self,
        caller: &Caller,
        permissions: &[&str],
    ) -> Result<bool, StoreError> {
        for permission in permissions {
            if self.has_permission(caller, permission).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Exact role-name membership; admins always pass
    pub fn has_role(&self, caller: &Caller, role_names: &[&str]) -> bool {
        caller.is_admin || role_names.iter().any(|r| *r == caller.role_name)
    }

    pub async fn check_any(&self, caller: &Caller, permissions: &[&str]) -> Result<Decision, StoreError> {
        if self.has_any_permission(caller, permissions).await? {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Deny {
                required: permissions.iter().map(|p| p.to_string()).collect(),
            })
        }
    }

    pub async fn require(&self, caller: &Caller, permission: &str) -> WorkflowResult<()> {
        self.require_any(caller, &[permission]).await
    }

    pub async fn require_any(&self, caller: &Caller, permissions: &[&str]) -> WorkflowResult<()> {
        self.check_any(caller, permissions).await?.into_result()
    }
}
