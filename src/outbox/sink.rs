use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::domain::LifecycleEvent;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Downstream consumer of committed lifecycle events
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LifecycleEventSink: Send + Sync {
    async fn deliver(&self, event: &LifecycleEvent) -> Result<(), SinkError>;
}

/// Publishes events to the structured log
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

#[async_trait]
impl LifecycleEventSink for TracingEventSink {
    async fn deliver(&self, event: &LifecycleEvent) -> Result<(), SinkError> {
        info!(
            event_id = %event.id,
            project_id = %event.project_id,
            event_type = %event.event_type.as_str(),
            payload = %event.payload,
            "Lifecycle event"
        );
        Ok(())
    }
}
