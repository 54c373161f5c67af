//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a dispatcher and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Logical cores left free for the calling thread and other subsystems.
    pub reserved_threads: usize,
    /// Whether `wait` runs queued jobs on the calling thread.
    pub use_main_thread_for_tasks: bool,
    /// Maximum number of jobs held by the queue.
    pub queue_capacity: usize,
    /// Explicit worker count, overriding the hardware-derived one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
    /// Prefix for worker thread names (`<prefix>-<n>`).
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reserved_threads: 1,
            use_main_thread_for_tasks: true,
            queue_capacity: 256,
            worker_threads: None,
            thread_name_prefix: "worker".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Set the number of reserved logical cores.
    pub fn with_reserved_threads(mut self, reserved_threads: usize) -> Self {
        self.reserved_threads = reserved_threads;
        self
    }

    /// Enable or disable cooperative execution inside `wait`.
    pub fn with_main_thread_for_tasks(mut self, enabled: bool) -> Self {
        self.use_main_thread_for_tasks = enabled;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Pin the number of worker threads instead of deriving it from the hardware.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = Some(worker_threads);
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Check the configuration before building a dispatcher from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyThreadNamePrefix);
        }
        Ok(())
    }

    /// Number of workers to spawn given `hardware_threads` logical cores.
    ///
    /// Reserving more threads than exist yields zero workers; the calling
    /// thread then runs every job itself.
    pub fn worker_count(&self, hardware_threads: usize) -> usize {
        self.worker_threads
            .unwrap_or_else(|| hardware_threads.saturating_sub(self.reserved_threads))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue_capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("thread_name_prefix must not be empty")]
    EmptyThreadNamePrefix,
}
