//! # Lifecycle events emitted by the scheduler, scopes, and tasks.
//!
//! [`EventKind`] classifies the transitions of the task state machine plus
//! scope lifecycle and scheduler diagnostics. The [`Event`] struct carries
//! metadata: timestamps, task id/name, execution context, reasons, delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskscope::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("demo-task")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("demo-task"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::dispatch::ContextClass;
use crate::tasks::{TaskId, TaskState};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of scheduler events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Task lifecycle ===
    /// Task was created and registered (state `New`).
    ///
    /// Sets: `task`, `task_id`, `context`.
    TaskSpawned,

    /// Task was admitted by its worker pool and entered `Active`.
    ///
    /// Sets: `task`, `task_id`.
    TaskStarted,

    /// Task reached a suspension point and released its worker.
    ///
    /// Sets: `task`, `task_id`, `reason` (`"delay"`, `"yield"`, `"join"`),
    /// `delay_ms` for timer waits.
    TaskSuspended,

    /// Task was re-admitted after its suspension condition cleared.
    ///
    /// Sets: `task`, `task_id`.
    TaskResumed,

    /// Cancellation was requested on a non-terminal task.
    ///
    /// Sets: `task`, `task_id`, optional `reason`.
    TaskCancelRequested,

    /// Task settled in `Completed`.
    ///
    /// Sets: `task`, `task_id`.
    TaskCompleted,

    /// Task settled in `Failed`.
    ///
    /// Sets: `task`, `task_id`, `reason` (fault message).
    TaskFailed,

    /// Task settled in `Cancelled` after observing the cancellation signal.
    ///
    /// Sets: `task`, `task_id`.
    TaskCancelled,

    // === Scope lifecycle ===
    /// Scope began closing: cancellation is propagating to its children.
    ///
    /// Sets: optional `reason` (cancellation cause or first fault).
    ScopeClosing,

    /// Scope reached `Closed`; every child is terminal.
    ScopeClosed,

    /// A child fault was recorded under `IsolateFailures` without affecting
    /// siblings.
    ///
    /// Sets: `task`, `task_id`, `reason` (fault message).
    FaultIsolated,

    // === Scheduler diagnostics ===
    /// An operation violated a lifecycle invariant (e.g. resume on a terminal
    /// task). The offending operation was aborted; the dispatcher keeps
    /// running.
    ///
    /// Sets: `reason` (violation detail), optionally `task`/`task_id`.
    InvariantViolated,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,
}

/// Scheduler event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Id of the task, if applicable.
    pub task_id: Option<TaskId>,
    /// Execution context the task is bound to.
    pub context: Option<ContextClass>,
    /// Observed task state at emission time.
    pub state: Option<TaskState>,
    /// Human-readable reason (fault message, cancellation cause, etc.).
    pub reason: Option<Arc<str>>,
    /// Timer-wait duration in milliseconds (compact).
    pub delay_ms: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_id: None,
            context: None,
            state: None,
            reason: None,
            delay_ms: None,
        }
    }

    /// Attaches a task (or subscriber) name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches the execution context class.
    #[inline]
    pub fn with_context(mut self, context: ContextClass) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches the observed task state.
    #[inline]
    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timer-wait duration (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::TaskSpawned);
        let b = Event::new(EventKind::TaskStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::new(EventKind::TaskSuspended)
            .with_task("worker")
            .with_reason("delay")
            .with_delay(Duration::from_millis(250));
        assert_eq!(ev.task.as_deref(), Some("worker"));
        assert_eq!(ev.reason.as_deref(), Some("delay"));
        assert_eq!(ev.delay_ms, Some(250));
    }
}
