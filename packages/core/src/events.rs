//! Event types for the diagnostic stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DispatchId, JobError};

/// Events emitted by the dispatch system for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Worker events
    /// A worker thread entered its run loop.
    WorkerStarted {
        worker_id: usize,
        thread_name: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker thread left its run loop.
    WorkerStopped {
        worker_id: usize,
        thread_name: String,
        jobs_run: u64,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job callback panicked. The rest of its group was skipped.
    JobPanicked {
        dispatch_id: DispatchId,
        group_id: u32,
        job_index: u32,
        message: String,
        thread_name: String,
        timestamp: DateTime<Utc>,
    },

    // Pool events
    /// All workers were stopped and joined.
    PoolShutdown {
        workers: usize,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Build a `JobPanicked` event from a job failure.
    pub fn job_panicked(error: &JobError, thread_name: impl Into<String>) -> Self {
        JobEvent::JobPanicked {
            dispatch_id: error.dispatch_id,
            group_id: error.group_id,
            job_index: error.job_index,
            message: error.message.clone(),
            thread_name: thread_name.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::WorkerStarted { timestamp, .. } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
            JobEvent::JobPanicked { timestamp, .. } => *timestamp,
            JobEvent::PoolShutdown { timestamp, .. } => *timestamp,
        }
    }

    /// Get the dispatch ID associated with this event, if any.
    pub fn dispatch_id(&self) -> Option<DispatchId> {
        match self {
            JobEvent::JobPanicked { dispatch_id, .. } => Some(*dispatch_id),
            _ => None,
        }
    }

    /// Whether this event reports a failed job.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobEvent::JobPanicked { .. })
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::WorkerStarted { thread_name, .. } => format!("Worker {} started", thread_name),
            JobEvent::WorkerStopped {
                thread_name,
                jobs_run,
                ..
            } => format!("Worker {} stopped after {} jobs", thread_name, jobs_run),
            JobEvent::JobPanicked {
                dispatch_id,
                group_id,
                job_index,
                message,
                thread_name,
                ..
            } => format!(
                "Job {} (group {}) of dispatch {} panicked on {}: {}",
                job_index, group_id, dispatch_id, thread_name, message
            ),
            JobEvent::PoolShutdown { workers, .. } => {
                format!("Worker pool shut down ({} workers joined)", workers)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicked_event_carries_error_fields() {
        let error = JobError {
            dispatch_id: DispatchId::new(),
            group_id: 3,
            job_index: 31,
            message: "boom".to_string(),
        };
        let event = JobEvent::job_panicked(&error, "worker-0");

        assert!(event.is_failure());
        assert_eq!(event.dispatch_id(), Some(error.dispatch_id));
        assert!(event.description().contains("worker-0: boom"));
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = JobEvent::PoolShutdown {
            workers: 4,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "pool_shutdown");
        assert_eq!(json["workers"], 4);

        let back: JobEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
