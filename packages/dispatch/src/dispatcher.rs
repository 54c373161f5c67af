//! Public dispatcher API for submitting jobs and joining on them.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use job_core::{
    DispatchId, DispatcherConfig, DispatcherStats, GroupRange, Job, JobCallback, JobContext,
    JobEvent, group_count,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::{DispatchError, DispatchResult};
use crate::latch::CountLatch;
use crate::pool::WorkerPool;
use crate::sink::DiagnosticSink;
use crate::worker::Shared;

/// How long a helping waiter sleeps before re-checking the queue.
const HELP_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Splits data-parallel work into jobs and runs them on a worker pool.
///
/// Callbacks must be `Send + Sync + 'static`; they are shared by every
/// group of a submission and may run on several threads at once. A single
/// group always runs on one thread, in index order.
///
/// Calling [`Dispatcher::wait`] from inside a job of the same dispatcher
/// blocks forever: the waiting job itself keeps the dispatcher busy.
pub struct Dispatcher {
    shared: Arc<Shared>,
    pool: WorkerPool,
    hardware_threads: usize,
}

impl Dispatcher {
    /// Create a dispatcher and start its worker threads.
    ///
    /// The calling thread is registered as `main` in the thread registry.
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        config.validate()?;

        let hardware_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let worker_count = config.worker_count(hardware_threads);

        let shared = Arc::new(Shared::new(
            config.queue_capacity,
            config.use_main_thread_for_tasks,
        ));
        shared.registry.register_current("main");

        tracing::info!(
            "Starting dispatcher: {} hardware threads, {} workers, queue capacity {}",
            hardware_threads,
            worker_count,
            config.queue_capacity
        );
        let pool = WorkerPool::spawn(shared.clone(), worker_count, &config.thread_name_prefix)?;

        Ok(Self {
            shared,
            pool,
            hardware_threads,
        })
    }

    /// Submit a single job covering index 0.
    ///
    /// If the queue is full the calling thread runs queued jobs until the
    /// new one fits.
    pub fn execute<F>(&self, callback: F) -> DispatchId
    where
        F: Fn(JobContext) + Send + Sync + 'static,
    {
        let dispatch_id = DispatchId::new();
        self.shared.begin_jobs(1);
        self.shared
            .push(Job::new(dispatch_id, GroupRange::SINGLE, Arc::new(callback)));
        self.shared.wake_one();
        dispatch_id
    }

    /// Split `job_count` indices into groups of `group_size` and queue one
    /// job per group.
    ///
    /// Returns `None` without doing anything when either count is zero.
    pub fn dispatch<F>(&self, job_count: u32, group_size: u32, callback: F) -> Option<DispatchId>
    where
        F: Fn(JobContext) + Send + Sync + 'static,
    {
        let groups = group_count(job_count, group_size);
        if groups == 0 {
            return None;
        }

        let dispatch_id = DispatchId::new();
        let callback: JobCallback = Arc::new(callback);
        tracing::debug!(
            "Dispatch {}: {} jobs in {} groups of {}",
            dispatch_id,
            job_count,
            groups,
            group_size
        );

        self.submit_groups(dispatch_id, job_count, group_size, callback, None);
        Some(dispatch_id)
    }

    /// Mutate every element of `data` in parallel, one owned chunk per group.
    ///
    /// Each group gets exclusive access to its own chunk, so callbacks can
    /// write without any extra synchronization. Blocks until this call's
    /// groups have finished (other outstanding work is not waited for) and
    /// returns the buffer in its original order. Elements of a group whose
    /// callback panicked are returned as the callback left them.
    pub fn dispatch_chunks<T, F>(
        &self,
        data: Vec<T>,
        group_size: u32,
        callback: F,
    ) -> DispatchResult<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(JobContext, &mut T) + Send + Sync + 'static,
    {
        let job_count =
            u32::try_from(data.len()).map_err(|_| DispatchError::TooManyItems(data.len()))?;
        let groups = group_count(job_count, group_size);
        if groups == 0 {
            return Ok(data);
        }

        let mut items = data.into_iter();
        let chunks: Arc<Vec<Mutex<Vec<T>>>> = Arc::new(
            GroupRange::partition(job_count, group_size)
                .map(|range| Mutex::new(items.by_ref().take(range.len() as usize).collect()))
                .collect(),
        );

        let job_chunks = chunks.clone();
        let callback: JobCallback = Arc::new(move |ctx: JobContext| {
            let mut chunk = job_chunks[ctx.group_id as usize].lock();
            callback(ctx, &mut chunk[ctx.group_index as usize]);
        });

        let dispatch_id = DispatchId::new();
        let latch = Arc::new(CountLatch::new(groups as usize));
        self.submit_groups(dispatch_id, job_count, group_size, callback, Some(latch.clone()));

        while !latch.is_done() {
            if self.helps_on_wait() && self.shared.task_loop() {
                continue;
            }
            latch.block_until(Some(Instant::now() + HELP_POLL_INTERVAL));
        }

        Ok(chunks
            .iter()
            .flat_map(|chunk| std::mem::take(&mut *chunk.lock()))
            .collect())
    }

    fn submit_groups(
        &self,
        dispatch_id: DispatchId,
        job_count: u32,
        group_size: u32,
        callback: JobCallback,
        latch: Option<Arc<CountLatch>>,
    ) {
        let groups = group_count(job_count, group_size);
        self.shared.begin_jobs(groups as usize);

        for range in GroupRange::partition(job_count, group_size) {
            let mut job = Job::new(dispatch_id, range, callback.clone());
            if let Some(latch) = &latch {
                let latch = latch.clone();
                job = job.with_on_finish(Arc::new(move || latch.count_down()));
            }
            self.shared.push(job);
        }

        self.shared.wake_all();
    }

    /// Block until every outstanding job has finished.
    ///
    /// Wakes all workers first. While jobs remain, the calling thread runs
    /// queued jobs itself when `use_main_thread_for_tasks` is set (or when
    /// the pool has no workers), and otherwise sleeps until the outstanding
    /// counter drops to zero. Returns at once when nothing is outstanding.
    pub fn wait(&self) {
        self.wait_until(None);
    }

    /// Like [`Dispatcher::wait`], giving up after `timeout`.
    ///
    /// Returns true if the dispatcher became idle.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Some(Instant::now() + timeout))
    }

    /// One cooperative wait step: wake all workers and, if enabled, run at
    /// most one queued job on the calling thread.
    ///
    /// Returns whether jobs are still outstanding afterwards.
    pub fn wait_step(&self) -> bool {
        self.shared.wake_all();
        if self.helps_on_wait() {
            self.shared.task_loop();
        }
        self.is_busy()
    }

    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        if !self.is_busy() {
            return true;
        }
        self.shared.wake_all();

        loop {
            if !self.is_busy() {
                return true;
            }

            let helping = self.helps_on_wait();
            if helping && self.shared.task_loop() {
                continue;
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return false;
            }

            // Producers signal the wake condition, not the idle one, so a
            // helping waiter polls for newly pushed jobs.
            let poll = helping.then(|| now + HELP_POLL_INTERVAL);
            let until = match (poll, deadline) {
                (Some(p), Some(d)) => Some(p.min(d)),
                (p, d) => p.or(d),
            };
            self.shared.block_until_idle(until);
        }
    }

    fn helps_on_wait(&self) -> bool {
        self.pool.len() == 0 || self.use_main_thread_for_tasks()
    }

    /// Whether any submitted job is queued or running.
    pub fn is_busy(&self) -> bool {
        self.shared.outstanding() > 0
    }

    /// Number of jobs queued or running.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding()
    }

    /// Advisory number of workers not occupied by outstanding jobs.
    pub fn available_thread_count(&self) -> u32 {
        let supported = self.supported_thread_count();
        if self.is_busy() {
            let outstanding = u32::try_from(self.outstanding()).unwrap_or(u32::MAX);
            supported.saturating_sub(outstanding)
        } else {
            supported
        }
    }

    /// Hardware threads detected on this machine.
    pub fn thread_count(&self) -> u32 {
        u32::try_from(self.hardware_threads).unwrap_or(u32::MAX)
    }

    /// Worker threads owned by this dispatcher.
    pub fn supported_thread_count(&self) -> u32 {
        u32::try_from(self.pool.len()).unwrap_or(u32::MAX)
    }

    /// Jobs currently waiting in the queue.
    pub fn queued_job_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn use_main_thread_for_tasks(&self) -> bool {
        self.shared.use_main_thread.load(Ordering::Relaxed)
    }

    /// Toggle whether `wait` runs jobs on the calling thread.
    pub fn set_use_main_thread_for_tasks(&self, enabled: bool) {
        self.shared.use_main_thread.store(enabled, Ordering::Relaxed);
    }

    /// Snapshot of thread and queue usage.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            total_threads: self.thread_count(),
            supported_threads: self.supported_thread_count(),
            available_threads: self.available_thread_count(),
            queued_jobs: self.queued_job_count() as u64,
            outstanding_jobs: self.outstanding() as u64,
            use_main_thread_for_tasks: self.use_main_thread_for_tasks(),
        }
    }

    /// Registered name of the calling thread.
    pub fn current_thread_name(&self) -> String {
        self.shared.registry.current_name()
    }

    /// Names of all registered threads, sorted.
    pub fn thread_names(&self) -> Vec<String> {
        self.shared.registry.list()
    }

    /// Receive dispatcher events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Register a sink that receives every event from now on.
    pub fn add_sink<S: DiagnosticSink>(&self, sink: S) {
        self.shared.events.add_sink(Arc::new(sink));
    }

    /// Run remaining queued jobs, stop and join all workers.
    pub fn shutdown(mut self) -> DispatchResult<()> {
        self.pool.shutdown().map(|_| ())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.pool.shutdown() {
            tracing::warn!("Dispatcher shutdown failed: {}", e);
        }
    }
}
