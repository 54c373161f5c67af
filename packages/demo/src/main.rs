use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use job_dispatch::{DispatchResult, Dispatcher, DispatcherConfig, FnSink, JobEvent};

/// Busy-wait for `ms` milliseconds to simulate CPU-bound work.
fn spin(ms: u64) {
    let until = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < until {
        std::hint::spin_loop();
    }
}

/// Times a block and logs the elapsed milliseconds when dropped.
struct Stopwatch {
    label: &'static str,
    started: Instant,
}

impl Stopwatch {
    fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        tracing::info!(
            "{} took {} ms",
            self.label,
            self.started.elapsed().as_millis()
        );
    }
}

fn singular_test(dispatcher: &Dispatcher) {
    let _timer = Stopwatch::start("Execute test");
    dispatcher.execute(|_| spin(100));
    dispatcher.wait();
}

fn looping_test(dispatcher: &Dispatcher) {
    let _timer = Stopwatch::start("Dispatch test");
    dispatcher.dispatch(1000, 100, |_| spin(10));
    dispatcher.wait();
}

fn log_stats(dispatcher: &Dispatcher) {
    match serde_json::to_string(&dispatcher.stats()) {
        Ok(json) => tracing::info!("Dispatcher stats: {}", json),
        Err(e) => tracing::warn!("Failed to serialize stats: {}", e),
    }
}

fn main() -> DispatchResult<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
    let failures = Arc::new(AtomicUsize::new(0));
    let sink_failures = failures.clone();
    dispatcher.add_sink(FnSink::new(move |event: &JobEvent| {
        if event.is_failure() {
            sink_failures.fetch_add(1, Ordering::Relaxed);
        }
    }));

    log_stats(&dispatcher);
    singular_test(&dispatcher);
    looping_test(&dispatcher);
    log_stats(&dispatcher);
    tracing::info!("{} job(s) failed", failures.load(Ordering::Relaxed));

    dispatcher.shutdown()
}
