//! Worker pool owning the dispatcher's OS threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use job_core::JobEvent;

use crate::error::{DispatchError, DispatchResult};
use crate::worker::{Shared, run_worker};

/// A fixed set of worker threads draining one shared queue.
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl WorkerPool {
    /// Spawn `count` workers named `<prefix>-<n>`.
    ///
    /// If any spawn fails, the workers started so far are stopped and
    /// joined before the error is returned.
    pub(crate) fn spawn(shared: Arc<Shared>, count: usize, prefix: &str) -> DispatchResult<Self> {
        let mut pool = Self {
            shared,
            handles: Vec::with_capacity(count),
            stopped: false,
        };

        for worker_id in 0..count {
            let thread_name = format!("{}-{}", prefix, worker_id);
            let worker_shared = pool.shared.clone();
            let worker_name = thread_name.clone();

            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_worker(worker_shared, worker_id, worker_name));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    tracing::warn!("Failed to spawn {}: {}", thread_name, e);
                    // Already-spawned workers are torn down by the error path.
                    let _ = pool.shutdown();
                    return Err(DispatchError::Spawn(e));
                }
            }
        }

        Ok(pool)
    }

    /// Number of worker threads owned by the pool.
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Stop all workers after they drain the queue, then join them.
    ///
    /// The calling thread helps drain the queue, so queued jobs still run
    /// when the pool has no workers. Returns the number of workers joined. Calling this again is a no-op.
    pub(crate) fn shutdown(&mut self) -> DispatchResult<usize> {
        if self.stopped {
            return Ok(0);
        }
        self.stopped = true;

        self.shared.begin_stop();
        while self.shared.task_loop() {}

        let workers = self.handles.len();
        let mut failed = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                failed += 1;
            }
        }

        tracing::info!("Worker pool shut down ({} workers)", workers);
        self.shared.events.emit(JobEvent::PoolShutdown {
            workers,
            timestamp: Utc::now(),
        });

        if failed > 0 {
            tracing::warn!("{} worker thread(s) panicked", failed);
            return Err(DispatchError::WorkerPanicked { failed });
        }
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawns_and_joins_named_workers() {
        let shared = Arc::new(Shared::new(16, false));
        let mut rx = shared.events.subscribe();
        let mut pool = WorkerPool::spawn(shared.clone(), 3, "test-pool").unwrap();
        assert_eq!(pool.len(), 3);

        assert_eq!(pool.shutdown().unwrap(), 3);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.shutdown().unwrap(), 0, "second shutdown is a no-op");

        let mut started = Vec::new();
        let mut stopped = 0;
        let mut shutdown = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                JobEvent::WorkerStarted { thread_name, .. } => started.push(thread_name),
                JobEvent::WorkerStopped { .. } => stopped += 1,
                JobEvent::PoolShutdown { workers, .. } => {
                    assert_eq!(workers, 3);
                    shutdown += 1;
                }
                JobEvent::JobPanicked { .. } => {}
            }
        }
        started.sort();
        assert_eq!(started, vec!["test-pool-0", "test-pool-1", "test-pool-2"]);
        assert_eq!(stopped, 3);
        assert_eq!(shutdown, 1);
    }

    #[test]
    fn empty_pool_runs_queued_jobs_on_shutdown() {
        use job_core::{DispatchId, GroupRange, Job};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let shared = Arc::new(Shared::new(16, false));
        let mut pool = WorkerPool::spawn(shared.clone(), 0, "none").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        shared.begin_jobs(5);
        for group_id in 0..5 {
            let calls = calls.clone();
            shared.push(Job::new(
                DispatchId::new(),
                GroupRange::nth(group_id, 5, 1),
                Arc::new(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            ));
        }

        assert_eq!(pool.shutdown().unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(shared.outstanding(), 0);
        assert!(shared.queue.is_empty());
    }

    #[test]
    fn empty_pool_shuts_down_cleanly() {
        let shared = Arc::new(Shared::new(4, true));
        let mut pool = WorkerPool::spawn(shared, 0, "none").unwrap();
        assert_eq!(pool.shutdown().unwrap(), 0);
    }
}
