//! # Task handles: the host-facing view of a running task.
//!
//! [`TaskHandle`] exposes lifecycle operations (`join`, `cancel`, `start`,
//! state checks). [`ResultHandle<T>`] additionally owns the typed result slot
//! and exposes [`ResultHandle::value`], which re-raises a stored fault in the
//! caller.
//!
//! ## Rules
//! - `join` never transitions the target; it only waits for a terminal state.
//! - `cancel` on an already-terminal task is a no-op (idempotent).
//! - `start` on a non-`New` task is a no-op.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::TaskError;
use crate::events::Bus;
use crate::tasks::cell::TaskCell;
use crate::tasks::{TaskId, TaskState};

/// Shared slot filled exactly once at the terminal transition.
pub(crate) type ResultSlot<T> = Arc<Mutex<Option<Result<T, TaskError>>>>;

/// Handle to a spawned task.
///
/// Cheap to clone; all clones observe the same task.
///
/// ## Example
/// ```no_run
/// use taskscope::{ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
///
/// # async fn demo() {
/// let sched = Scheduler::new(SchedulerConfig::default());
/// let scope = sched.scope(FailurePolicy::FailFast);
/// let handle = scope.spawn("worker", ContextClass::Io, StartMode::Eager, |ctx| async move {
///     ctx.check_cancelled()?;
///     Ok(())
/// });
/// handle.join().await;
/// assert!(handle.is_completed());
/// # }
/// ```
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) cell: Arc<TaskCell>,
    pub(crate) bus: Bus,
}

impl TaskHandle {
    pub(crate) fn new(cell: Arc<TaskCell>, bus: Bus) -> Self {
        Self { cell, bus }
    }

    /// Unique identifier of the task.
    pub fn id(&self) -> TaskId {
        self.cell.id()
    }

    /// Task name given at spawn.
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// True while the task has started and not yet settled.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            TaskState::Active | TaskState::Suspended | TaskState::Cancelling
        )
    }

    /// True once the task settled in `Completed`.
    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// True once the task settled in `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Starts a lazily-spawned task.
    ///
    /// No-op unless the task is still `New`. Returns whether this call
    /// actually launched it.
    pub fn start(&self) -> bool {
        self.cell.start()
    }

    /// Requests cooperative cancellation.
    ///
    /// Idempotent; a terminal task is untouched. The task observes the
    /// request at its next suspension point or explicit check.
    ///
    /// Returns `true` if the task was still live when the request landed.
    pub fn cancel(&self) -> bool {
        self.cell.cancel_with_bus(&self.bus, None)
    }

    /// Like [`TaskHandle::cancel`] with a recorded cause.
    pub fn cancel_with_reason(&self, reason: &str) -> bool {
        self.cell.cancel_with_bus(&self.bus, Some(reason))
    }

    /// Waits cooperatively until the task is terminal.
    ///
    /// Returns immediately if it already is; never transitions the target.
    pub async fn join(&self) {
        self.cell.wait_terminal().await;
    }
}

/// Handle to a task spawned with a typed result.
///
/// Everything a [`TaskHandle`] offers, plus [`ResultHandle::value`] for
/// retrieving the computed value or the stored fault.
pub struct ResultHandle<T> {
    handle: TaskHandle,
    pub(crate) slot: ResultSlot<T>,
}

impl<T> ResultHandle<T> {
    pub(crate) fn new(handle: TaskHandle, slot: ResultSlot<T>) -> Self {
        Self { handle, slot }
    }

    /// The untyped view of the same task.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// Unique identifier of the task.
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    /// See [`TaskHandle::start`].
    pub fn start(&self) -> bool {
        self.handle.start()
    }

    /// See [`TaskHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// See [`TaskHandle::join`].
    pub async fn join(&self) {
        self.handle.join().await;
    }

    /// Waits until the result slot is filled and returns the computed value.
    ///
    /// Re-raises the stored fault if the task `Failed`; yields
    /// [`TaskError::Cancelled`] if the task was cancelled (including a lazy
    /// task cancelled before it ever started, whose slot stays empty).
    pub async fn value(self) -> Result<T, TaskError> {
        self.handle.join().await;
        let stored = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stored {
            Some(res) => res,
            None => Err(TaskError::Cancelled),
        }
    }
}
