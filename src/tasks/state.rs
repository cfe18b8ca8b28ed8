//! # Task lifecycle state machine.
//!
//! Every task moves monotonically along this graph; terminal states never
//! transition again.
//!
//! ```text
//!                ┌──────────► Completed
//!                │
//! New ──► Active ◄──► Suspended
//!  │         │            │
//!  │         ├────────────┼──► Cancelling ──► Cancelled
//!  │         │            │        │
//!  │         └► Failed    │        └────────► Failed   (fault during cleanup)
//!  │                      │
//!  └──────────────────────┴──► Cancelling              (cancel before/while waiting)
//! ```
//!
//! ## Rules
//! - `New → Active` on first scheduling (eager) or explicit `start()` (lazy).
//! - `Active ⇄ Suspended` around every suspension point.
//! - Any non-terminal state moves to `Cancelling` when cancellation is
//!   requested; the task's own code observes it at its next suspension point
//!   or explicit check.
//! - `Cancelling → Cancelled` once cleanup completes; `Cancelling → Failed`
//!   if a genuine fault occurs during cleanup (cancellation never swallows a
//!   real failure).

use std::fmt;

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Global counter for task identities.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates the next unique id.
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not yet scheduled (lazy tasks stay here until `start()`).
    New,
    /// Occupying a worker and executing.
    Active,
    /// Parked at a suspension point; the worker is released.
    Suspended,
    /// Cancellation requested and not yet settled; cleanup may be running.
    Cancelling,
    /// Terminal: settled after observing the cancellation signal.
    Cancelled,
    /// Terminal: body ran to completion, result stored.
    Completed,
    /// Terminal: body raised an unrecovered fault, stored in the result slot.
    Failed,
}

impl TaskState {
    /// True for `Cancelled`, `Completed`, and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Completed | TaskState::Failed
        )
    }

    /// Whether the lifecycle graph permits `self → to`.
    ///
    /// Terminal states permit nothing; everything else follows the module
    /// diagram.
    pub fn can_transition(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (New, Active)
                | (New, Cancelling)
                | (Active, Suspended)
                | (Suspended, Active)
                | (Active, Cancelling)
                | (Suspended, Cancelling)
                | (Active, Completed)
                | (Active, Failed)
                | (Cancelling, Cancelled)
                | (Cancelling, Failed)
        )
    }

    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            TaskState::New => "new",
            TaskState::Active => "active",
            TaskState::Suspended => "suspended",
            TaskState::Cancelling => "cancelling",
            TaskState::Cancelled => "cancelled",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
