use std::sync::Once;

use job_dispatch::{DispatchResult, Dispatcher, DispatcherConfig};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Dispatcher with a fixed worker count so tests behave the same on any machine.
pub fn dispatcher_with(workers: usize, queue_capacity: usize) -> DispatchResult<Dispatcher> {
    init_tracing();
    Dispatcher::new(
        DispatcherConfig::default()
            .with_worker_threads(workers)
            .with_queue_capacity(queue_capacity)
            .with_thread_name_prefix("test-worker"),
    )
}

pub fn dispatcher(workers: usize) -> DispatchResult<Dispatcher> {
    dispatcher_with(workers, 256)
}
