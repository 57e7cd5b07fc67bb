use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Role, User};

/// Identity of the user invoking an operation, resolved fresh per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn from_parts(user: &User, role: &Role) -> Self {
        Self {
            user_id: user.id,
            role_id: role.id,
            role_name: role.name.clone(),
            is_admin: role.is_admin,
        }
    }
}
