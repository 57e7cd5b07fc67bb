//! SQLite store tests against a throwaway database file
#![cfg(feature = "database")]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use item_lifecycle::auth::{roles, seed_defaults, OwnershipPolicy};
use item_lifecycle::config::DatabaseConfig;
use item_lifecycle::database::DatabaseManager;
use item_lifecycle::domain::{LifecycleType, OutboxStatus, PermissionGrant, ProjectStatus, StepStatus, User};
use item_lifecycle::store::{
    DirectoryStore, OutboxStore, PermissionStore, SqliteStore, StoreError, WorkflowStore,
};
use item_lifecycle::workflow::transition::plan_advance;
use item_lifecycle::workflow::WorkflowEngine;
use tempfile::TempDir;
use uuid::Uuid;

mod fixtures;
use fixtures::{new_project, user_with_role};

struct Db {
    _dir: TempDir,
    manager: DatabaseManager,
    store: Arc<SqliteStore>,
}

async fn database() -> Db {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("lifecycle.db").display()),
        max_connections: 4,
        auto_migrate: true,
        busy_timeout_ms: 5_000,
    };
    let manager = DatabaseManager::new(&config).await.unwrap();
    let store = Arc::new(manager.store());
    seed_defaults(store.as_ref()).await.unwrap();
    Db {
        _dir: dir,
        manager,
        store,
    }
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    let db = database().await;
    let again = seed_defaults(db.store.as_ref()).await.unwrap();
    assert_eq!(again.permissions_created, 0);
    assert_eq!(again.roles_created, 0);
    assert_eq!(again.roles_granted, 0);
    assert_eq!(db.store.list_permissions().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_full_walk_persists_steps_and_side_effects() {
    let db = database().await;
    let admin = user_with_role(db.store.as_ref(), roles::ADMIN).await;
    let engine = WorkflowEngine::new(db.store.clone(), OwnershipPolicy::StageOwner);

    let status = engine
        .create_project(new_project(LifecycleType::DeletingItem))
        .await
        .unwrap();
    let project_id = status.project.id;
    for _ in 0..5 {
        engine.advance(project_id, &admin, Some("ok")).await.unwrap();
    }

    let reloaded = db.store.load_workflow(project_id).await.unwrap();
    assert_eq!(reloaded.project.status, ProjectStatus::Completed);
    assert_eq!(reloaded.project.current_stage, "Completed");
    assert!(reloaded.project.completed_at.is_some());
    assert_eq!(reloaded.current_step().unwrap().step_order, 6);
    assert!(reloaded.steps[..5]
        .iter()
        .all(|s| s.status == StepStatus::Completed && s.completed_by == Some(admin.user_id)));
    assert_eq!(reloaded.steps[5].required_role, None);

    assert_eq!(db.store.audit_log(project_id).await.unwrap().len(), 5);
    assert_eq!(db.store.comments(project_id).await.unwrap().len(), 5);
    assert_eq!(db.store.outbox_entries(project_id).await.unwrap().len(), 5);
    db.manager.shutdown().await;
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let db = database().await;
    let engine = WorkflowEngine::new(db.store.clone(), OwnershipPolicy::Coarse);
    let status = engine
        .create_project(new_project(LifecycleType::NewItem))
        .await
        .unwrap();

    let err = engine
        .initialize(status.project.id, LifecycleType::NewItem)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    let reloaded = db.store.load_workflow(status.project.id).await.unwrap();
    assert_eq!(reloaded.steps.len(), 8);
}

#[tokio::test]
async fn test_stale_plan_is_a_version_conflict() {
    let db = database().await;
    let engine = WorkflowEngine::new(db.store.clone(), OwnershipPolicy::Coarse);
    let status = engine
        .create_project(new_project(LifecycleType::TransitioningItem))
        .await
        .unwrap();
    let project_id = status.project.id;

    let snapshot = db.store.load_workflow(project_id).await.unwrap();
    let actor = Uuid::new_v4();
    let first = plan_advance(&snapshot, actor, None, Utc::now()).unwrap();
    let second = plan_advance(&snapshot, actor, Some("late"), Utc::now()).unwrap();

    db.store.commit_transition(&first).await.unwrap();
    let err = db.store.commit_transition(&second).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    let reloaded = db.store.load_workflow(project_id).await.unwrap();
    let active: Vec<_> = reloaded
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::InProgress)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].step_order, 2);
    assert!(db.store.comments(project_id).await.unwrap().is_empty());
    assert_eq!(db.store.outbox_entries(project_id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_advances_serialize_per_project() {
    let db = database().await;
    let admin = user_with_role(db.store.as_ref(), roles::ADMIN).await;
    let engine = Arc::new(WorkflowEngine::new(db.store.clone(), OwnershipPolicy::Coarse));
    let status = engine
        .create_project(new_project(LifecycleType::NewItem))
        .await
        .unwrap();
    let project_id = status.project.id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let admin = admin.clone();
            tokio::spawn(async move { engine.advance(project_id, &admin, None).await })
        })
        .collect();

    let mut successes = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected error {err:?}"),
        }
    }
    assert!(successes >= 1);

    let reloaded = db.store.load_workflow(project_id).await.unwrap();
    let active: Vec<_> = reloaded
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::InProgress)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].step_order, 1 + successes);
    assert_eq!(reloaded.project.current_stage, active[0].step_name);
    assert_eq!(reloaded.project.version, 1 + i64::from(successes));
}

#[tokio::test]
async fn test_grant_replacement_rolls_back_on_unknown_permission() {
    let db = database().await;
    let role = db.store.find_role_by_name(roles::SUPPLIER).await.unwrap().unwrap();
    let before = db.store.role_permissions(role.id).await.unwrap();
    let known = db.store.list_permissions().await.unwrap()[0].id;

    let err = db
        .store
        .replace_role_permissions(
            role.id,
            &[
                PermissionGrant {
                    permission_id: known,
                    granted: true,
                },
                PermissionGrant {
                    permission_id: Uuid::new_v4(),
                    granted: true,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(db.store.role_permissions(role.id).await.unwrap(), before);

    let toggled = db
        .store
        .replace_role_permissions(
            role.id,
            &[PermissionGrant {
                permission_id: known,
                granted: true,
            }],
        )
        .await
        .unwrap();
    assert_eq!(toggled.len(), 1);
    assert!(toggled[0].granted);
}

#[tokio::test]
async fn test_user_with_unknown_role_is_rejected() {
    let db = database().await;
    let err = db
        .store
        .insert_user(&User {
            id: Uuid::new_v4(),
            name: "Nobody".to_string(),
            email: "nobody@example.test".to_string(),
            role_id: Uuid::new_v4(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "role", .. }));
}

fn live_claims() -> DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(30)
}

#[tokio::test]
async fn test_outbox_claim_cycle() {
    let db = database().await;
    let admin = user_with_role(db.store.as_ref(), roles::ADMIN).await;
    let engine = WorkflowEngine::new(db.store.clone(), OwnershipPolicy::Coarse);
    let status = engine
        .create_project(new_project(LifecycleType::NewItem))
        .await
        .unwrap();
    engine.advance(status.project.id, &admin, None).await.unwrap();

    let claimed = db.store.claim_next("worker-a", live_claims()).await.unwrap().unwrap();
    assert_eq!(claimed.attempt_count, 1);
    assert_eq!(claimed.claimed_by.as_deref(), Some("worker-a"));
    assert!(claimed.claimed_at.is_some());
    assert!(db.store.claim_next("worker-b", live_claims()).await.unwrap().is_none());

    db.store.record_failure(claimed.event.id, "sink offline").await.unwrap();
    let retried = db.store.claim_next("worker-b", live_claims()).await.unwrap().unwrap();
    assert_eq!(retried.attempt_count, 2);

    db.store.mark_processed(retried.event.id).await.unwrap();
    let entries = db.store.outbox_entries(status.project.id).await.unwrap();
    assert_eq!(entries[0].status, OutboxStatus::Processed);
    assert!(entries[0].processed_at.is_some());
}

#[tokio::test]
async fn test_abandoned_claim_is_taken_over_in_order() {
    let db = database().await;
    let admin = user_with_role(db.store.as_ref(), roles::ADMIN).await;
    let engine = WorkflowEngine::new(db.store.clone(), OwnershipPolicy::Coarse);
    let status = engine
        .create_project(new_project(LifecycleType::NewItem))
        .await
        .unwrap();
    let project_id = status.project.id;
    engine.advance(project_id, &admin, None).await.unwrap();
    engine.advance(project_id, &admin, None).await.unwrap();

    let abandoned = db.store.claim_next("worker-a", live_claims()).await.unwrap().unwrap();
    // A live claim on the oldest event holds back the newer one
    assert!(db.store.claim_next("worker-b", live_claims()).await.unwrap().is_none());

    let taken_over = db.store.claim_next("worker-b", Utc::now()).await.unwrap().unwrap();
    assert_eq!(taken_over.event.id, abandoned.event.id);
    assert_eq!(taken_over.claimed_by.as_deref(), Some("worker-b"));
    assert_eq!(taken_over.attempt_count, 2);

    db.store.mark_processed(taken_over.event.id).await.unwrap();
    let next = db.store.claim_next("worker-b", live_claims()).await.unwrap().unwrap();
    assert!(next.seq > abandoned.seq);
    assert_eq!(next.attempt_count, 1);
}
