//! Core domain types for the job dispatch system.
//!
//! This crate contains the types shared by the runtime and its callers:
//! - Job, JobContext and group partitioning for units of work
//! - BoundedJobQueue for handing jobs to worker threads
//! - DispatcherConfig and DispatcherStats for setup and diagnostics
//! - Events for the diagnostic stream

mod config;
mod events;
mod job;
mod queue;

pub use config::{ConfigError, DispatcherConfig};
pub use events::JobEvent;
pub use job::{
    DispatchId, FinishHook, GroupRange, Job, JobCallback, JobContext, JobError, group_count,
};
pub use queue::{BoundedJobQueue, DispatcherStats};
