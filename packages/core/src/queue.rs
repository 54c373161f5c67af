//! Bounded job queue shared between producers and worker threads.

use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};

use crate::Job;

/// Fixed-capacity multi-producer/multi-consumer queue of jobs.
///
/// Neither operation blocks: a full queue hands the job back to the
/// producer, an empty queue yields `None`. Each accepted job is handed to
/// exactly one consumer.
#[derive(Debug)]
pub struct BoundedJobQueue {
    slots: ArrayQueue<Job>,
}

impl BoundedJobQueue {
    /// Create a queue holding at most `capacity` jobs.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. `DispatcherConfig::validate` rejects
    /// that value before a queue is built.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity),
        }
    }

    /// Try to append a job at the tail.
    ///
    /// Returns the job back when the queue is at capacity so the caller can
    /// retry without rebuilding it.
    pub fn push_back(&self, job: Job) -> Result<(), Job> {
        self.slots.push(job)
    }

    /// Try to take the job at the head.
    pub fn pop_front(&self) -> Option<Job> {
        self.slots.pop()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of jobs currently queued.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }
}

/// Point-in-time view of a dispatcher's thread and queue usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherStats {
    /// Hardware threads detected on this machine.
    pub total_threads: u32,
    /// Worker threads owned by the pool.
    pub supported_threads: u32,
    /// Advisory count of workers not busy with outstanding jobs.
    pub available_threads: u32,
    /// Jobs waiting in the queue.
    pub queued_jobs: u64,
    /// Jobs queued or running.
    pub outstanding_jobs: u64,
    /// Whether `wait` runs jobs on the calling thread.
    pub use_main_thread_for_tasks: bool,
}

impl DispatcherStats {
    /// Jobs taken off the queue but not finished yet.
    pub fn running_jobs(&self) -> u64 {
        self.outstanding_jobs.saturating_sub(self.queued_jobs)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding_jobs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DispatchId, GroupRange};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn job(group_id: u32) -> Job {
        Job::new(
            DispatchId::new(),
            GroupRange {
                group_id,
                offset: 0,
                end: 1,
            },
            Arc::new(|_| {}),
        )
    }

    #[test]
    fn push_fails_when_full_without_overwriting() {
        let queue = BoundedJobQueue::new(2);
        assert!(queue.push_back(job(0)).is_ok());
        assert!(queue.push_back(job(1)).is_ok());
        assert!(queue.is_full());

        let rejected = queue.push_back(job(2)).unwrap_err();
        assert_eq!(rejected.group_id(), 2);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_front().map(|j| j.group_id()), Some(0));
        assert_eq!(queue.pop_front().map(|j| j.group_id()), Some(1));
    }

    #[test]
    fn pop_fails_when_empty() {
        let queue = BoundedJobQueue::new(4);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn concurrent_consumers_never_share_a_job() {
        let queue = Arc::new(BoundedJobQueue::new(512));
        for group_id in 0..500 {
            queue.push_back(job(group_id)).unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(job) = queue.pop_front() {
                        taken.push(job.group_id());
                    }
                    taken
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for consumer in consumers {
            for group_id in consumer.join().unwrap() {
                assert!(seen.insert(group_id), "group {group_id} delivered twice");
            }
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn stats_running_jobs_excludes_queued() {
        let stats = DispatcherStats {
            queued_jobs: 3,
            outstanding_jobs: 5,
            ..Default::default()
        };
        assert_eq!(stats.running_jobs(), 2);
        assert!(!stats.is_idle());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["outstanding_jobs"], 5);
    }
}
