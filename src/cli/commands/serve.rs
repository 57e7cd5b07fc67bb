use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::auth::seed_defaults;
use crate::config::ItemLifecycleConfig;
use crate::http::{build_router, AppState};
use crate::outbox::{OutboxDispatcher, TracingEventSink};
use crate::shutdown::{until_shutdown, ShutdownCoordinator};
use crate::store::{DirectoryStore, MemoryStore, OutboxStore, PermissionStore, WorkflowStore};
use crate::workflow::WorkflowEngine;

pub struct ServeCommand {
    pub bind: Option<String>,
    pub memory: bool,
}

impl ServeCommand {
    pub fn new() -> Self {
        Self {
            bind: None,
            memory: false,
        }
    }

    pub fn with_bind(mut self, bind: Option<String>) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    pub async fn execute(&self, config: &ItemLifecycleConfig) -> Result<()> {
        if self.memory {
            let store = Arc::new(MemoryStore::new());
            seed_defaults(store.as_ref()).await?;
            let admin =
                super::create_admin_user(store.as_ref(), "Administrator", "admin@localhost").await?;
            info!(user_id = %admin.id, "In-memory store seeded; use this id as X-User-Id");
            return self.run(store, config).await;
        }
        self.run_database(config).await
    }

    #[cfg(feature = "database")]
    async fn run_database(&self, config: &ItemLifecycleConfig) -> Result<()> {
        use crate::database::DatabaseManager;

        let db_config = config
            .database
            .as_ref()
            .context("No [database] section configured; pass --memory to run without one")?;
        let manager = DatabaseManager::new(db_config).await?;
        let result = self.run(Arc::new(manager.store()), config).await;
        manager.shutdown().await;
        result
    }

    #[cfg(not(feature = "database"))]
    async fn run_database(&self, _config: &ItemLifecycleConfig) -> Result<()> {
        anyhow::bail!("built without the 'database' feature; pass --memory")
    }

    async fn run<S>(&self, store: Arc<S>, config: &ItemLifecycleConfig) -> Result<()>
    where
        S: WorkflowStore + PermissionStore + DirectoryStore + OutboxStore + 'static,
    {
        let engine = WorkflowEngine::new(store.clone(), config.workflow.ownership_policy);
        let state = Arc::new(AppState::from_store(
            store.clone(),
            engine,
            config.workflow.strict_lifecycle_types,
        ));
        let router = build_router(state);

        let coordinator = Arc::new(ShutdownCoordinator::new());
        let signals = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_signal().await })
        };

        let dispatcher = if config.outbox.enabled {
            let dispatcher = OutboxDispatcher::new(
                store,
                Arc::new(TracingEventSink),
                config.outbox.poll_interval(),
                config.outbox.max_attempts,
                config.outbox.resolved_worker_id(),
            )
            .with_claim_lease(config.outbox.claim_lease());
            let shutdown = coordinator.subscribe();
            Some(tokio::spawn(async move { dispatcher.run(shutdown).await }))
        } else {
            None
        };

        let addr = self
            .bind
            .clone()
            .unwrap_or_else(|| config.server.bind_addr.clone());
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(addr = %addr, "Item lifecycle API listening");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(until_shutdown(coordinator.subscribe()))
            .await;

        coordinator.trigger();
        signals.abort();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }
        served.context("HTTP server failed")?;
        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}

impl Default for ServeCommand {
    fn default() -> Self {
        Self::new()
    }
}
