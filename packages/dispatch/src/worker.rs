//! Shared dispatcher state and the worker run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use job_core::{BoundedJobQueue, Job, JobEvent};
use parking_lot::{Condvar, Mutex};

use crate::registry::ThreadRegistry;
use crate::sink::EventBus;

/// State shared by the dispatcher, its workers and any helping caller.
pub(crate) struct Shared {
    pub(crate) queue: BoundedJobQueue,
    /// Jobs pushed but not finished yet.
    outstanding: AtomicUsize,
    wake_lock: Mutex<()>,
    wake: Condvar,
    idle_lock: Mutex<()>,
    idle: Condvar,
    stopping: AtomicBool,
    pub(crate) use_main_thread: AtomicBool,
    pub(crate) events: EventBus,
    pub(crate) registry: ThreadRegistry,
}

impl Shared {
    pub(crate) fn new(queue_capacity: usize, use_main_thread: bool) -> Self {
        Self {
            queue: BoundedJobQueue::new(queue_capacity),
            outstanding: AtomicUsize::new(0),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            stopping: AtomicBool::new(false),
            use_main_thread: AtomicBool::new(use_main_thread),
            events: EventBus::new(),
            registry: ThreadRegistry::new(),
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Account for `count` jobs before any of them is pushed.
    pub(crate) fn begin_jobs(&self, count: usize) {
        self.outstanding.fetch_add(count, Ordering::AcqRel);
    }

    fn finish_job(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "outstanding job counter underflow");
        if previous == 1 {
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }

    /// Take one job off the queue and run it on the calling thread.
    ///
    /// Returns false without blocking when the queue is empty.
    pub(crate) fn task_loop(&self) -> bool {
        let Some(job) = self.queue.pop_front() else {
            return false;
        };

        if let Err(error) = job.run() {
            let thread_name = self.registry.current_name();
            self.events.emit(JobEvent::job_panicked(&error, thread_name));
        }

        drop(job);
        self.finish_job();
        true
    }

    /// Push a job, helping to drain the queue while it is full.
    pub(crate) fn push(&self, mut job: Job) {
        loop {
            match self.queue.push_back(job) {
                Ok(()) => return,
                Err(rejected) => {
                    job = rejected;
                    self.wake_all();
                    if !self.task_loop() {
                        thread::yield_now();
                    }
                }
            }
        }
    }

    pub(crate) fn wake_one(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_one();
    }

    pub(crate) fn wake_all(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    /// Park a worker until a producer signals new work or shutdown begins.
    fn sleep_until_woken(&self) {
        let mut guard = self.wake_lock.lock();
        if self.queue.is_empty() && !self.is_stopping() {
            self.wake.wait(&mut guard);
        }
    }

    /// Block until the counter reaches zero or `until` passes.
    pub(crate) fn block_until_idle(&self, until: Option<Instant>) {
        let mut guard = self.idle_lock.lock();
        if self.outstanding() == 0 {
            return;
        }
        match until {
            Some(deadline) => {
                self.idle.wait_until(&mut guard, deadline);
            }
            None => self.idle.wait(&mut guard),
        }
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn begin_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake_all();
    }
}

/// Body of one worker thread.
///
/// Runs jobs while any are queued and sleeps otherwise. Once shutdown has
/// begun the worker drains what is left in the queue and exits.
pub(crate) fn run_worker(shared: Arc<Shared>, worker_id: usize, thread_name: String) {
    shared.registry.register_current(thread_name.clone());
    tracing::info!("Starting worker: {}", thread_name);
    shared.events.emit(JobEvent::WorkerStarted {
        worker_id,
        thread_name: thread_name.clone(),
        timestamp: Utc::now(),
    });

    let mut jobs_run: u64 = 0;
    loop {
        if shared.task_loop() {
            jobs_run += 1;
            continue;
        }
        if shared.is_stopping() {
            break;
        }
        shared.sleep_until_woken();
    }

    tracing::info!("Shutting down worker: {}", thread_name);
    shared.events.emit(JobEvent::WorkerStopped {
        worker_id,
        thread_name,
        jobs_run,
        timestamp: Utc::now(),
    });
    shared.registry.unregister(thread::current().id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_core::{DispatchId, GroupRange};
    use std::sync::atomic::AtomicU32;

    fn counting_job(hits: &Arc<AtomicU32>, range: GroupRange) -> Job {
        let hits = hits.clone();
        Job::new(
            DispatchId::new(),
            range,
            Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn task_loop_on_empty_queue_returns_false() {
        let shared = Shared::new(4, true);
        assert!(!shared.task_loop());
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn task_loop_runs_whole_range_and_releases_counter() {
        let shared = Shared::new(4, true);
        let hits = Arc::new(AtomicU32::new(0));
        shared.begin_jobs(1);
        shared.push(counting_job(
            &hits,
            GroupRange {
                group_id: 0,
                offset: 10,
                end: 25,
            },
        ));

        assert!(shared.task_loop());
        assert_eq!(hits.load(Ordering::SeqCst), 15);
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn panicking_job_still_releases_counter() {
        let shared = Shared::new(4, true);
        let mut rx = shared.events.subscribe();
        shared.begin_jobs(1);
        shared.push(Job::new(
            DispatchId::new(),
            GroupRange::SINGLE,
            Arc::new(|_| panic!("job failure")),
        ));

        assert!(shared.task_loop());
        assert_eq!(shared.outstanding(), 0);
        assert!(matches!(rx.try_recv(), Ok(JobEvent::JobPanicked { .. })));
    }

    #[test]
    fn push_on_full_queue_runs_jobs_on_caller() {
        let shared = Shared::new(1, true);
        let hits = Arc::new(AtomicU32::new(0));
        shared.begin_jobs(3);
        for _ in 0..3 {
            shared.push(counting_job(&hits, GroupRange::SINGLE));
        }

        // Two pushes found the queue full and ran the queued job themselves.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(shared.outstanding(), 1);
        assert!(shared.task_loop());
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn stopping_worker_drains_queue_then_exits() {
        let shared = Arc::new(Shared::new(8, true));
        let hits = Arc::new(AtomicU32::new(0));
        shared.begin_jobs(5);
        for _ in 0..5 {
            shared.push(counting_job(&hits, GroupRange::SINGLE));
        }
        shared.begin_stop();

        let worker_shared = shared.clone();
        thread::spawn(move || run_worker(worker_shared, 0, "worker-0".to_string()))
            .join()
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(shared.outstanding(), 0);
        assert!(shared.registry.is_empty());
    }
}
