//! Integration tests for the authorization gate against seeded grants
//!
//! Grants are read from the store on every check, so edits made through
//! replace-by-role must be visible to the very next call.

use item_lifecycle::auth::{permissions, roles, AuthorizationGate, Decision, OwnershipPolicy};
use item_lifecycle::domain::{LifecycleType, PermissionGrant, ProjectStatus};
use item_lifecycle::store::{PermissionStore, StoreError, WorkflowStore};
use item_lifecycle::workflow::WorkflowError;

mod fixtures;
use fixtures::Harness;

fn gate(harness: &Harness) -> AuthorizationGate {
    AuthorizationGate::new(harness.store.clone())
}

async fn set_grant(harness: &Harness, role_name: &str, permission: &str, granted: bool) {
    let store = harness.store.as_ref();
    let role = store.find_role_by_name(role_name).await.unwrap().unwrap();
    let catalog = store.list_permissions().await.unwrap();
    let current = store.role_permissions(role.id).await.unwrap();

    let grants: Vec<PermissionGrant> = catalog
        .iter()
        .map(|p| PermissionGrant {
            permission_id: p.id,
            granted: if p.name == permission {
                granted
            } else {
                current
                    .iter()
                    .any(|rp| rp.permission_id == p.id && rp.granted)
            },
        })
        .collect();
    store.replace_role_permissions(role.id, &grants).await.unwrap();
}

#[tokio::test]
async fn test_admin_bypasses_every_check() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let admin = harness.admin().await;
    let gate = gate(&harness);

    assert!(gate.has_permission(&admin, permissions::MANAGE_PERMISSIONS).await.unwrap());
    assert!(gate.has_permission(&admin, "NOT_A_PERMISSION").await.unwrap());
    assert!(gate.has_role(&admin, &[roles::SUPPLIER]));
}

#[tokio::test]
async fn test_unknown_permission_is_not_granted() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let manager = harness.user(roles::CATEGORY_MANAGER).await;
    assert!(!gate(&harness)
        .has_permission(&manager, "TELEPORT_ITEM")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_has_any_and_has_role() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let supplier = harness.user(roles::SUPPLIER).await;
    let gate = gate(&harness);

    assert!(gate
        .has_any_permission(&supplier, &permissions::VIEW_WORKFLOW)
        .await
        .unwrap());
    assert!(!gate
        .has_any_permission(&supplier, &[permissions::MOVE_BACK_WORKFLOW, permissions::VIEW_AUDIT_LOG])
        .await
        .unwrap());
    assert!(gate.has_role(&supplier, &[roles::LOGISTICS, roles::SUPPLIER]));
    assert!(!gate.has_role(&supplier, &["supplier"]));
}

#[tokio::test]
async fn test_denial_names_every_acceptable_permission() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let supplier = harness.user(roles::SUPPLIER).await;

    let decision = gate(&harness)
        .check_any(&supplier, &[permissions::MOVE_BACK_WORKFLOW, permissions::VIEW_AUDIT_LOG])
        .await
        .unwrap();
    assert_eq!(
        decision,
        Decision::Deny {
            required: vec!["MOVE_BACK_WORKFLOW".to_string(), "VIEW_AUDIT_LOG".to_string()]
        }
    );
    let err = decision.into_result().unwrap_err();
    assert_eq!(
        err.to_string(),
        "insufficient permission: requires MOVE_BACK_WORKFLOW or VIEW_AUDIT_LOG"
    );
}

#[tokio::test]
async fn test_grant_toggle_is_visible_on_next_check() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let supplier = harness.user(roles::SUPPLIER).await;
    let gate = gate(&harness);

    let require_move_back = || gate.require(&supplier, permissions::MOVE_BACK_WORKFLOW);
    assert!(matches!(
        require_move_back().await,
        Err(WorkflowError::Forbidden { .. })
    ));

    set_grant(&harness, roles::SUPPLIER, permissions::MOVE_BACK_WORKFLOW, true).await;
    assert!(require_move_back().await.is_ok());

    set_grant(&harness, roles::SUPPLIER, permissions::MOVE_BACK_WORKFLOW, false).await;
    assert!(require_move_back().await.is_err());
}

#[tokio::test]
async fn test_denied_caller_cannot_mutate_workflow() {
    let harness = Harness::new(OwnershipPolicy::Coarse).await;
    let logistics = harness.user(roles::LOGISTICS).await;
    set_grant(&harness, roles::LOGISTICS, permissions::ADVANCE_WORKFLOW, false).await;
    let status = harness.create(LifecycleType::NewItem).await;
    let project_id = status.project.id;

    let gate = gate(&harness);
    let result = gate.require(&logistics, permissions::ADVANCE_WORKFLOW).await;
    assert!(matches!(result, Err(WorkflowError::Forbidden { ref required }) if required == &["ADVANCE_WORKFLOW"]));

    let reloaded = harness.store.load_workflow(project_id).await.unwrap();
    assert_eq!(reloaded.project.version, status.project.version);
    assert_eq!(reloaded.current_step().unwrap().step_order, 1);
    assert!(harness.store.audit_log(project_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stage_owner_policy_gates_on_active_step_role() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let manager = harness.user(roles::CATEGORY_MANAGER).await;
    let logistics = harness.user(roles::LOGISTICS).await;
    let status = harness.create(LifecycleType::NewItem).await;
    let project_id = status.project.id;

    // Draft belongs to the category manager
    let err = harness.engine.advance(project_id, &logistics, None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
    assert_eq!(
        harness.engine.current_step(project_id).await.unwrap().unwrap().step_order,
        1
    );

    harness.engine.advance(project_id, &manager, None).await.unwrap();
    // Freight Strategy belongs to logistics
    let status = harness.engine.advance(project_id, &logistics, None).await.unwrap();
    assert_eq!(status.project.current_stage, "Supplier Pricing");
}

#[tokio::test]
async fn test_replace_with_unknown_permission_keeps_existing_grants() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let store = harness.store.as_ref();
    let role = store.find_role_by_name(roles::LOGISTICS).await.unwrap().unwrap();
    let before = store.role_permissions(role.id).await.unwrap();

    let err = store
        .replace_role_permissions(
            role.id,
            &[PermissionGrant {
                permission_id: uuid::Uuid::new_v4(),
                granted: true,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(store.role_permissions(role.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_reopening_completed_project_needs_owner_of_reentered_stage() {
    let harness = Harness::new(OwnershipPolicy::StageOwner).await;
    let logistics = harness.user(roles::LOGISTICS).await;
    let dc_operator = harness.user(roles::DC_OPERATOR).await;
    let done = harness.project_at(LifecycleType::NewItem, 8).await;
    let project_id = done.project.id;

    // Completed has no owner; moving back re-enters In Transition
    let err = harness
        .engine
        .move_back(project_id, &logistics, Some("reopen"))
        .await
        .unwrap_err();
    match err {
        WorkflowError::Forbidden { required } => assert_eq!(required, ["ROLE:DC Operator"]),
        other => panic!("expected Forbidden, got {other:?}"),
    }
    let unchanged = harness.engine.status(project_id).await.unwrap();
    assert_eq!(unchanged.project.status, ProjectStatus::Completed);
    assert_eq!(unchanged.project.version, done.project.version);

    let reopened = harness
        .engine
        .move_back(project_id, &dc_operator, Some("stock not set up"))
        .await
        .unwrap();
    assert_eq!(reopened.project.status, ProjectStatus::InProgress);
    assert_eq!(reopened.project.current_stage, "In Transition");
}
