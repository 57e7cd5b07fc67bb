use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Workflow transition counters
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    pub advances: AtomicU64,
    pub move_backs: AtomicU64,
    pub completions: AtomicU64,
    pub conflicts: AtomicU64,
    pub invalid_transitions: AtomicU64,
    pub denials: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub events_dead_lettered: AtomicU64,
}

impl TransitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_advance(&self, completed_project: bool) {
        self.advances.fetch_add(1, Ordering::Relaxed);
        if completed_project {
            self.completions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_move_back(&self) {
        self.move_backs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        warn!("Concurrent workflow transition rejected");
    }

    pub fn record_invalid_transition(&self) {
        self.invalid_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self) {
        self.denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> TransitionStats {
        TransitionStats {
            advances: self.advances.load(Ordering::Relaxed),
            move_backs: self.move_backs.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_dead_lettered: self.events_dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Workflow metrics: advances={}, move_backs={}, completions={}, conflicts={}, invalid={}, denials={}, events={}, dead_letters={}",
            stats.advances,
            stats.move_backs,
            stats.completions,
            stats.conflicts,
            stats.invalid_transitions,
            stats.denials,
            stats.events_dispatched,
            stats.events_dead_lettered
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionStats {
    pub advances: u64,
    pub move_backs: u64,
    pub completions: u64,
    pub conflicts: u64,
    pub invalid_transitions: u64,
    pub denials: u64,
    pub events_dispatched: u64,
    pub events_dead_lettered: u64,
}

/// Global metrics instance
static WORKFLOW_METRICS: std::sync::LazyLock<TransitionMetrics> =
    std::sync::LazyLock::new(TransitionMetrics::new);

pub fn workflow_metrics() -> &'static TransitionMetrics {
    &WORKFLOW_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = TransitionMetrics::new();
        metrics.record_advance(false);
        metrics.record_advance(true);
        metrics.record_move_back();
        metrics.record_conflict();

        let stats = metrics.get_stats();
        assert_eq!(stats.advances, 2);
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.move_backs, 1);
        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.denials, 0);
    }
}
