//! Diagnostic sinks and the event bus that feeds them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use job_core::JobEvent;
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Capacity of the broadcast channel handed out by `subscribe`.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Trait for receivers of dispatcher events.
///
/// Implement this to forward job failures and worker lifecycle events to
/// an error reporter, a metrics pipeline or a test harness. `report` runs
/// on the thread that produced the event, usually a worker.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn report(&self, event: &JobEvent);
}

/// A simple function-based sink.
pub struct FnSink<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnSink<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    /// Create a new function-based sink.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> DiagnosticSink for FnSink<F>
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    fn report(&self, event: &JobEvent) {
        (self.handler)(event)
    }
}

/// Fans events out to the log, broadcast subscribers and registered sinks.
pub(crate) struct EventBus {
    tx: broadcast::Sender<JobEvent>,
    sinks: RwLock<Vec<Arc<dyn DiagnosticSink>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn add_sink(&self, sink: Arc<dyn DiagnosticSink>) {
        self.sinks.write().push(sink);
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        if event.is_failure() {
            tracing::error!("{}", event.description());
        } else {
            tracing::debug!("{}", event.description());
        }

        for sink in self.sinks.read().iter() {
            // Sink panics stay here; the job counter is released after emit.
            if panic::catch_unwind(AssertUnwindSafe(|| sink.report(&event))).is_err() {
                tracing::warn!("Diagnostic sink panicked while reporting an event");
            }
        }

        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shutdown_event() -> JobEvent {
        JobEvent::PoolShutdown {
            workers: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn emit_reaches_sinks_and_subscribers() {
        let bus = EventBus::new();
        let reported = Arc::new(AtomicUsize::new(0));
        let reported_sink = reported.clone();
        bus.add_sink(Arc::new(FnSink::new(move |_event: &JobEvent| {
            reported_sink.fetch_add(1, Ordering::SeqCst);
        })));
        let mut rx = bus.subscribe();

        bus.emit(shutdown_event());

        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(matches!(rx.try_recv(), Ok(JobEvent::PoolShutdown { .. })));
    }

    #[test]
    fn panicking_sink_does_not_block_others() {
        let bus = EventBus::new();
        let reported = Arc::new(AtomicUsize::new(0));
        let reported_sink = reported.clone();
        bus.add_sink(Arc::new(FnSink::new(|_event: &JobEvent| panic!("sink failure"))));
        bus.add_sink(Arc::new(FnSink::new(move |_event: &JobEvent| {
            reported_sink.fetch_add(1, Ordering::SeqCst);
        })));

        bus.emit(shutdown_event());
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventBus::new().emit(shutdown_event());
    }
}
