//! Shared setup for the workflow integration tests: a seeded in-memory store,
//! one user per default role and helpers to park a project at a given stage.
#![allow(dead_code)]

use std::sync::Arc;

use item_lifecycle::auth::{roles, seed_defaults, Caller, OwnershipPolicy};
use item_lifecycle::domain::{LifecycleType, NewProject, User};
use item_lifecycle::store::{DirectoryStore, MemoryStore, PermissionStore};
use item_lifecycle::workflow::{WorkflowEngine, WorkflowStatus};
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: WorkflowEngine,
}

impl Harness {
    /// Seeded store with the engine running the given ownership policy
    pub async fn new(policy: OwnershipPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        seed_defaults(store.as_ref()).await.expect("seed default catalog");
        let engine = WorkflowEngine::new(store.clone(), policy);
        Self { store, engine }
    }

    pub async fn user(&self, role_name: &str) -> Caller {
        user_with_role(self.store.as_ref(), role_name).await
    }

    pub async fn admin(&self) -> Caller {
        self.user(roles::ADMIN).await
    }

    pub async fn create(&self, lifecycle: LifecycleType) -> WorkflowStatus {
        self.engine
            .create_project(new_project(lifecycle))
            .await
            .expect("create project")
    }

    /// A project whose active step has `step_order == order`
    pub async fn project_at(&self, lifecycle: LifecycleType, order: u32) -> WorkflowStatus {
        let admin = self.admin().await;
        let mut status = self.create(lifecycle).await;
        for _ in 1..order {
            status = self
                .engine
                .advance(status.project.id, &admin, None)
                .await
                .expect("advance to requested stage");
        }
        status
    }
}

pub async fn user_with_role<S>(store: &S, role_name: &str) -> Caller
where
    S: PermissionStore + DirectoryStore,
{
    let role = store
        .find_role_by_name(role_name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("role {role_name} is not seeded"));
    let id = Uuid::new_v4();
    let user = User {
        id,
        name: format!("{role_name} user"),
        email: format!("{id}@example.test"),
        role_id: role.id,
    };
    store.insert_user(&user).await.unwrap();
    store.resolve_caller(id).await.unwrap().expect("caller resolves")
}

pub fn new_project(lifecycle: LifecycleType) -> NewProject {
    NewProject {
        name: format!("{lifecycle} test item"),
        lifecycle_type: lifecycle,
        created_by_id: Uuid::new_v4(),
        organization_id: None,
    }
}
