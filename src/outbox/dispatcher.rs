//! OutboxDispatcher - background task that claims lifecycle events and hands
//! them to a sink.
//!
//! Delivery happens after the transition has committed, so a failing sink
//! never rolls back workflow state. Failed deliveries are released for retry
//! until `max_attempts`, then dead-lettered. A claim that is never settled,
//! for example because its worker died, is taken over once its lease expires.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::sink::LifecycleEventSink;
use crate::domain::OutboxEntry;
use crate::observability::workflow_metrics;
use crate::store::OutboxStore;

/// Counts from one pass over the outbox
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.processed == 0 && self.retried == 0 && self.dead_lettered == 0
    }
}

pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    sink: Arc<dyn LifecycleEventSink>,
    interval: Duration,
    max_attempts: u32,
    worker_id: String,
    claim_lease: Duration,
}

pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(30);

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        sink: Arc<dyn LifecycleEventSink>,
        interval: Duration,
        max_attempts: u32,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            outbox,
            sink,
            interval,
            max_attempts: max_attempts.max(1),
            worker_id: worker_id.into(),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Claims made at or before this instant are considered abandoned
    fn stale_before(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.claim_lease)
            .ok()
            .and_then(|lease| Utc::now().checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run until `shutdown` flips to true. Spawn via `tokio::spawn`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.worker_id,
            "OutboxDispatcher started (poll interval={:?}, max_attempts={})",
            self.interval,
            self.max_attempts
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.drain_once().await;
            if !report.is_empty() {
                tracing::debug!(?report, "Outbox pass finished");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(worker_id = %self.worker_id, "OutboxDispatcher stopped");
    }

    /// Deliver pending events until the outbox is empty or a delivery fails.
    ///
    /// A failed event is left for the next pass rather than retried in a loop.
    pub async fn drain_once(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let entry = match self.outbox.claim_next(&self.worker_id, self.stale_before()).await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Outbox claim failed: {e}");
                    break;
                }
            };

            if self.dispatch(entry, &mut report).await.is_err() {
                break;
            }
        }
        report
    }

    async fn dispatch(&self, entry: OutboxEntry, report: &mut DrainReport) -> Result<(), ()> {
        let seq = entry.seq;
        let event_id = entry.event.id;
        tracing::debug!("Processing outbox event seq={seq} id={event_id}");

        match self.sink.deliver(&entry.event).await {
            Ok(()) => {
                if let Err(e) = self.outbox.mark_processed(event_id).await {
                    tracing::error!("Failed to mark outbox event {event_id} as processed: {e}");
                    return Err(());
                }
                workflow_metrics().record_event_dispatched();
                report.processed += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    attempt = entry.attempt_count,
                    "Delivery failed for outbox event seq={seq}: {e}"
                );
                if entry.attempt_count >= self.max_attempts {
                    tracing::error!(
                        "DEAD LETTER: outbox_seq={seq} exceeded max_attempts={}",
                        self.max_attempts
                    );
                    if let Err(mark_err) = self.outbox.mark_dead_letter(event_id, &e.to_string()).await {
                        tracing::error!("Failed to dead-letter outbox event {event_id}: {mark_err}");
                    } else {
                        workflow_metrics().record_dead_letter();
                        report.dead_lettered += 1;
                    }
                } else if let Err(mark_err) = self.outbox.record_failure(event_id, &e.to_string()).await {
                    tracing::error!("Failed to record failure for outbox event {event_id}: {mark_err}");
                } else {
                    report.retried += 1;
                }
                Err(())
            }
        }
    }
}
