//! Thread-pool job dispatcher.
//!
//! This crate runs data-parallel jobs on a fixed pool of OS threads fed by
//! one bounded queue.
//!
//! # Architecture
//!
//! - `Dispatcher` - Public API: `execute`, `dispatch`, `wait`, `is_busy`
//! - `WorkerPool` - Owns the worker threads and joins them on shutdown
//! - `ThreadRegistry` - Names threads for logs and events
//! - `DiagnosticSink` - Receives job failures and worker lifecycle events
//!
//! # Usage
//!
//! ```no_run
//! use job_dispatch::{Dispatcher, DispatcherConfig};
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//!
//! // Process 1000 items in groups of 100
//! dispatcher.dispatch(1000, 100, |ctx| {
//!     let _ = ctx.job_index;
//! });
//! dispatcher.wait();
//! # Ok::<(), job_dispatch::DispatchError>(())
//! ```

mod dispatcher;
mod error;
mod latch;
mod pool;
mod registry;
mod sink;
mod worker;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use registry::ThreadRegistry;
pub use sink::{DiagnosticSink, FnSink};

/// Re-export core types for convenience.
pub use job_core::{
    DispatchId, DispatcherConfig, DispatcherStats, GroupRange, JobContext, JobError, JobEvent,
};
