// Built-in role and permission catalog plus idempotent seeding

use tracing::info;

use crate::domain::PermissionGrant;
use crate::store::{PermissionStore, StoreError};

/// Functional role names. Stage ownership in the registry refers to these.
pub mod roles {
    pub const ADMIN: &str = "Admin";
    pub const CATEGORY_MANAGER: &str = "Category Manager";
    pub const LOGISTICS: &str = "Logistics";
    pub const SUPPLIER: &str = "Supplier";
    pub const PRICING_SPECIALIST: &str = "Pricing Specialist";
    pub const STRATEGIC_SUPPLY_MANAGER: &str = "Strategic Supply Manager";
    pub const DC_OPERATOR: &str = "DC Operator";
}

/// Stable permission keys checked by the authorization gate
pub mod permissions {
    pub const ADVANCE_WORKFLOW: &str = "ADVANCE_WORKFLOW";
    pub const MOVE_BACK_WORKFLOW: &str = "MOVE_BACK_WORKFLOW";
    pub const VIEW_PROJECT: &str = "VIEW_PROJECT";
    pub const VIEW_ALL_PROJECTS: &str = "VIEW_ALL_PROJECTS";
    pub const VIEW_OWN_PROJECTS: &str = "VIEW_OWN_PROJECTS";
    pub const CREATE_PROJECT: &str = "CREATE_PROJECT";
    pub const VIEW_AUDIT_LOG: &str = "VIEW_AUDIT_LOG";
    pub const MANAGE_PERMISSIONS: &str = "MANAGE_PERMISSIONS";

    /// Any one of these allows reading a project's workflow
    pub const VIEW_WORKFLOW: [&str; 3] = [VIEW_PROJECT, VIEW_ALL_PROJECTS, VIEW_OWN_PROJECTS];
}

use permissions::*;

pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    (ADVANCE_WORKFLOW, "Workflow"),
    (MOVE_BACK_WORKFLOW, "Workflow"),
    (VIEW_PROJECT, "Projects"),
    (VIEW_ALL_PROJECTS, "Projects"),
    (VIEW_OWN_PROJECTS, "Projects"),
    (CREATE_PROJECT, "Projects"),
    (VIEW_AUDIT_LOG, "Administration"),
    (MANAGE_PERMISSIONS, "Administration"),
];

/// Default role table: (name, is_admin, granted permissions)
pub const DEFAULT_ROLES: &[(&str, bool, &[&str])] = &[
    (roles::ADMIN, true, &[]),
    (
        roles::CATEGORY_MANAGER,
        false,
        &[
            ADVANCE_WORKFLOW,
            MOVE_BACK_WORKFLOW,
            VIEW_PROJECT,
            VIEW_ALL_PROJECTS,
            CREATE_PROJECT,
            VIEW_AUDIT_LOG,
        ],
    ),
    (
        roles::LOGISTICS,
        false,
        &[ADVANCE_WORKFLOW, MOVE_BACK_WORKFLOW, VIEW_PROJECT],
    ),
    (roles::SUPPLIER, false, &[ADVANCE_WORKFLOW, VIEW_OWN_PROJECTS]),
    (
        roles::PRICING_SPECIALIST,
        false,
        &[ADVANCE_WORKFLOW, MOVE_BACK_WORKFLOW, VIEW_PROJECT],
    ),
    (
        roles::STRATEGIC_SUPPLY_MANAGER,
        false,
        &[ADVANCE_WORKFLOW, MOVE_BACK_WORKFLOW, VIEW_PROJECT, VIEW_ALL_PROJECTS],
    ),
    (
        roles::DC_OPERATOR,
        false,
        &[ADVANCE_WORKFLOW, MOVE_BACK_WORKFLOW, VIEW_PROJECT],
    ),
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub roles_granted: usize,
}

/// Install the default catalog.
///
/// Existing permissions and roles are left alone; a non-admin role only
/// receives its default grants while it has no grant rows at all, so
/// administrator edits survive a re-seed.
pub async fn seed_defaults(store: &dyn PermissionStore) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();

    let mut catalog = Vec::with_capacity(DEFAULT_PERMISSIONS.len());
    for (name, category) in DEFAULT_PERMISSIONS {
        let (permission, created) = store.ensure_permission(name, category).await?;
        if created {
            report.permissions_created += 1;
        }
        catalog.push(permission);
    }

    for (role_name, is_admin, granted) in DEFAULT_ROLES {
        let (role, created) = store.ensure_role(role_name, *is_admin).await?;
        if created {
            report.roles_created += 1;
        }
        if role.is_admin || !store.role_permissions(role.id).await?.is_empty() {
            continue;
        }
        let grants: Vec<PermissionGrant> = catalog
            .iter()
            .map(|p| PermissionGrant {
                permission_id: p.id,
                granted: granted.contains(&p.name.as_str()),
            })
            .collect();
        store.replace_role_permissions(role.id, &grants).await?;
        report.roles_granted += 1;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        roles_granted = report.roles_granted,
        "Seeded default role catalog"
    );
    Ok(report)
}
