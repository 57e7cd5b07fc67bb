// Lifecycle event delivery from the durable outbox

pub mod dispatcher;
pub mod sink;

pub use dispatcher::{DrainReport, OutboxDispatcher};
pub use sink::{LifecycleEventSink, SinkError, TracingEventSink};
