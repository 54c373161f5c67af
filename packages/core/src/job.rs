//! Job domain types for units of queued work.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for one `execute` or `dispatch` call.
///
/// Every job pushed by the same call carries the same id, so diagnostics
/// can be traced back to the submission that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(pub Ulid);

impl DispatchId {
    /// Create a new unique dispatch ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a dispatch ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arguments handed to a job callback for every index it iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    /// Absolute index into the logical item range.
    pub job_index: u32,
    /// Group the index belongs to.
    pub group_id: u32,
    /// Index relative to the start of the group.
    pub group_index: u32,
    /// True only for the first index of the group.
    pub is_first_in_group: bool,
    /// True only for the last index of the group.
    pub is_last_in_group: bool,
}

/// Half-open index range `[offset, end)` covered by one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRange {
    pub group_id: u32,
    pub offset: u32,
    pub end: u32,
}

impl GroupRange {
    /// The single-index range used by `execute`.
    pub const SINGLE: GroupRange = GroupRange {
        group_id: 0,
        offset: 0,
        end: 1,
    };

    /// Range of the `group_id`-th group when `job_count` items are split
    /// into groups of `group_size`. The final group is clamped to `job_count`.
    pub fn nth(group_id: u32, job_count: u32, group_size: u32) -> Self {
        let offset = group_id.saturating_mul(group_size);
        let end = offset.saturating_add(group_size).min(job_count);
        Self {
            group_id,
            offset,
            end,
        }
    }

    /// Split `job_count` items into consecutive groups of at most `group_size`.
    ///
    /// Yields nothing when either argument is zero.
    pub fn partition(job_count: u32, group_size: u32) -> impl Iterator<Item = GroupRange> {
        (0..group_count(job_count, group_size))
            .map(move |group_id| Self::nth(group_id, job_count, group_size))
    }

    /// Number of indices in the range.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the context for an absolute index inside this range.
    pub fn context(&self, job_index: u32) -> JobContext {
        JobContext {
            job_index,
            group_id: self.group_id,
            group_index: job_index - self.offset,
            is_first_in_group: job_index == self.offset,
            is_last_in_group: job_index + 1 == self.end,
        }
    }
}

/// Number of groups needed to cover `job_count` items with `group_size` per group.
pub fn group_count(job_count: u32, group_size: u32) -> u32 {
    if job_count == 0 || group_size == 0 {
        return 0;
    }
    job_count.div_ceil(group_size)
}

/// Callback shared by every job of one submission.
pub type JobCallback = Arc<dyn Fn(JobContext) + Send + Sync + 'static>;

/// Hook invoked once a job is finished, whether it succeeded or panicked.
pub type FinishHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// A job is one queued unit of work covering a contiguous index range.
pub struct Job {
    /// Submission this job belongs to.
    pub dispatch_id: DispatchId,
    /// Indices this job iterates, in order.
    pub range: GroupRange,
    callback: JobCallback,
    on_finish: Option<FinishHook>,
}

impl Job {
    /// Create a job that runs `callback` over `range`.
    pub fn new(dispatch_id: DispatchId, range: GroupRange, callback: JobCallback) -> Self {
        Self {
            dispatch_id,
            range,
            callback,
            on_finish: None,
        }
    }

    /// Attach a hook that runs after the job finishes.
    pub fn with_on_finish(mut self, hook: FinishHook) -> Self {
        self.on_finish = Some(hook);
        self
    }

    pub fn group_id(&self) -> u32 {
        self.range.group_id
    }

    /// Run the callback for every index of the range on the current thread.
    ///
    /// A panic stops the rest of the group and is returned as a `JobError`
    /// naming the index that panicked. The finish hook runs in both cases.
    pub fn run(&self) -> Result<(), JobError> {
        let mut current = self.range.offset;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for job_index in self.range.offset..self.range.end {
                current = job_index;
                (self.callback)(self.range.context(job_index));
            }
        }));

        if let Some(hook) = &self.on_finish {
            hook();
        }

        outcome.map_err(|payload| JobError {
            dispatch_id: self.dispatch_id,
            group_id: self.range.group_id,
            job_index: current,
            message: panic_message(payload.as_ref()),
        })
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("dispatch_id", &self.dispatch_id)
            .field("range", &self.range)
            .field("has_on_finish", &self.on_finish.is_some())
            .finish_non_exhaustive()
    }
}

/// Failure of a single job callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job_index} of group {group_id} in dispatch {dispatch_id} panicked: {message}")]
pub struct JobError {
    pub dispatch_id: DispatchId,
    pub group_id: u32,
    pub job_index: u32,
    pub message: String,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
