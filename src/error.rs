//! Error types used by the taskscope runtime and tasks.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`] — outcomes surfaced by individual task bodies.
//! - [`RuntimeError`] — internal-consistency errors raised by the scheduler itself.
//!
//! Cancellation is modeled as [`TaskError::Cancelled`]. It is a signal, not a
//! genuine failure: it unwinds the cancelled task's cleanup and settles the
//! task in the `Cancelled` state, but it never trips a scope's fail-fast
//! propagation. Use [`TaskError::is_cancellation`] to tell the two apart.

use thiserror::Error;

use crate::dispatch::ContextClass;

/// # Errors produced by task execution.
///
/// A task body returns `Result<T, TaskError>`. The error is stored in the
/// task's result slot at the terminal transition and re-raised to anyone
/// awaiting the task via [`ResultHandle::value`](crate::ResultHandle::value).
///
/// The type is `Clone` so a single stored fault can be observed by the
/// awaiting caller *and* reported through the owning scope's policy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Cooperative cancellation was observed at a suspension point or check.
    ///
    /// Not a true error: tasks settle in `Cancelled`, and scopes never treat
    /// it as a child fault.
    #[error("task cancelled")]
    Cancelled,

    /// Unrecovered fault from task body logic (including a caught panic).
    ///
    /// Terminal: stored in the result slot and observable via `join`/`value`.
    #[error("task fault: {message}")]
    Fault {
        /// The underlying error message.
        message: String,
    },
}

impl TaskError {
    /// Convenience constructor for a [`TaskError::Fault`].
    ///
    /// # Example
    /// ```
    /// use taskscope::TaskError;
    ///
    /// let err = TaskError::fault("boom");
    /// assert!(!err.is_cancellation());
    /// ```
    pub fn fault(message: impl Into<String>) -> Self {
        TaskError::Fault {
            message: message.into(),
        }
    }

    /// Returns `true` for the cancellation signal.
    ///
    /// Scopes use this to avoid mistaking cooperative interruption for a
    /// genuine child failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskscope::TaskError;
    ///
    /// assert_eq!(TaskError::Cancelled.as_label(), "task_cancelled");
    /// assert_eq!(TaskError::fault("x").as_label(), "task_fault");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Cancelled => "task_cancelled",
            TaskError::Fault { .. } => "task_fault",
        }
    }
}

/// # Errors produced by the scheduler itself.
///
/// These represent internal-consistency failures of the dispatch machinery.
/// They are always reported (published as events, returned to the offending
/// caller) and abort only the operation that raised them — never the
/// dispatcher or unrelated tasks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A scheduling operation violated a lifecycle invariant, e.g. resuming
    /// a task that already reached a terminal state.
    #[error("scheduler invariant violated: {detail}")]
    InvariantViolation {
        /// Description of the violated invariant.
        detail: String,
    },

    /// The worker pool for the given execution context has been closed
    /// (scheduler shutdown in progress).
    #[error("worker pool closed: {context}")]
    PoolClosed {
        /// Execution context whose pool rejected the admission.
        context: ContextClass,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvariantViolation { .. } => "invariant_violation",
            RuntimeError::PoolClosed { .. } => "pool_closed",
        }
    }
}
