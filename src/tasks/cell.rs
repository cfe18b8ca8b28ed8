//! # TaskCell: the shared record behind every task.
//!
//! A cell is the arena entry for one task: identity, lifecycle state (as a
//! `watch` channel so joiners can wait for transitions), the per-task
//! cancellation token, the worker permit currently held, and the deferred
//! launch closure of a lazy task.
//!
//! Scopes hold `Arc<TaskCell>` index sets; cells never reference their scope,
//! so the parent/child "tree" carries no cyclic ownership.
//!
//! ## Rules
//! - Non-terminal transitions go through [`TaskCell::try_transition`] /
//!   [`TaskCell::transition_if`]; both enforce the lifecycle graph. Terminal
//!   settlement goes through [`TaskCell::settle`], which decides and applies
//!   the final state in a single atomic step.
//! - The cancellation token is a monotonic latch (false→true only).
//! - The worker permit is present exactly while the task is `Active`.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::dispatch::ContextClass;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{TaskId, TaskState};

/// Deferred launch of a lazy task; invoking it spawns the task driver.
pub(crate) type Launch = Box<dyn FnOnce() + Send>;

/// Result of a cancellation request on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    /// The task had already settled; nothing to do (idempotent no-op).
    AlreadyTerminal,
    /// Cancellation was already requested earlier; latch unchanged.
    AlreadyRequested,
    /// First request: the task moved to `Cancelling` and will observe the
    /// signal at its next suspension point or check.
    Requested,
    /// The task was a never-started lazy task; with no body to unwind it
    /// settled to `Cancelled` immediately.
    CancelledUnstarted,
}

/// Shared per-task record.
pub(crate) struct TaskCell {
    id: TaskId,
    name: Arc<str>,
    class: ContextClass,
    state: watch::Sender<TaskState>,
    token: CancellationToken,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    launch: Mutex<Option<Launch>>,
}

fn lock<'a, T>(m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskCell {
    /// Creates a cell in the `New` state.
    pub(crate) fn new(name: Arc<str>, class: ContextClass, token: CancellationToken) -> Arc<Self> {
        let (state, _) = watch::channel(TaskState::New);
        Arc::new(Self {
            id: TaskId::next(),
            name,
            class,
            state,
            token,
            permit: Mutex::new(None),
            launch: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn class(&self) -> ContextClass {
        self.class
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Suspends the caller until the cell reaches a terminal state.
    ///
    /// Returns immediately if already terminal.
    pub(crate) async fn wait_terminal(&self) {
        let mut rx = self.state.subscribe();
        // sender lives in self, so wait_for cannot observe a closed channel
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// The cancellation latch (monotonic false→true).
    pub(crate) fn cancellation_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation has been requested.
    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Applies `current → to` if the graph allows it; otherwise reports the
    /// violated invariant without changing state.
    pub(crate) fn try_transition(&self, to: TaskState) -> Result<(), RuntimeError> {
        let mut illegal_from = None;
        self.state.send_if_modified(|s| {
            if s.can_transition(to) {
                *s = to;
                true
            } else {
                illegal_from = Some(*s);
                false
            }
        });
        match illegal_from {
            None => Ok(()),
            Some(from) => Err(RuntimeError::InvariantViolation {
                detail: format!("task {} {}: illegal transition {from} -> {to}", self.name, self.id),
            }),
        }
    }

    /// Atomically settles the cell in a terminal state.
    ///
    /// The terminal decision and the transition are one step: if cancellation
    /// moved the cell to `Cancelling` after the body already produced its
    /// outcome, a `Completed` request lands as `Cancelled` (the routing the
    /// graph prescribes), while `Failed` stays `Failed` so a fault is never
    /// swallowed. `fill` runs with the decided terminal *before* the new
    /// state becomes visible to joiners, so a woken `join()` always finds the
    /// result slot populated.
    ///
    /// Returns the applied terminal, or `None` if the cell already settled.
    pub(crate) fn settle(
        &self,
        desired: TaskState,
        fill: impl FnOnce(TaskState),
    ) -> Option<TaskState> {
        let mut applied = None;
        self.state.send_if_modified(|s| {
            if s.is_terminal() {
                return false;
            }
            let terminal = if desired == TaskState::Completed && *s == TaskState::Cancelling {
                TaskState::Cancelled
            } else {
                desired
            };
            fill(terminal);
            *s = terminal;
            applied = Some(terminal);
            true
        });
        applied
    }

    /// CAS-style transition: applies `from → to` only when the current state
    /// is exactly `from` and the edge is legal. Returns whether it applied.
    pub(crate) fn transition_if(&self, from: TaskState, to: TaskState) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|s| {
            if *s == from && s.can_transition(to) {
                *s = to;
                applied = true;
                true
            } else {
                false
            }
        });
        applied
    }

    /// Stores the deferred launch closure of a lazy task.
    pub(crate) fn store_launch(&self, launch: Launch) {
        *lock(&self.launch) = Some(launch);
    }

    /// Takes the deferred launch closure, if still present.
    pub(crate) fn take_launch(&self) -> Option<Launch> {
        lock(&self.launch).take()
    }

    /// Invokes the deferred launch if the task is still `New`.
    ///
    /// No-op on a non-`New` task. Returns whether a launch happened.
    pub(crate) fn start(&self) -> bool {
        if self.state() != TaskState::New {
            return false;
        }
        match self.take_launch() {
            Some(launch) => {
                launch();
                true
            }
            None => false,
        }
    }

    /// Parks the worker permit while the task executes.
    pub(crate) fn store_permit(&self, permit: OwnedSemaphorePermit) {
        *lock(&self.permit) = Some(permit);
    }

    /// Releases the worker permit (suspension point or terminal transition).
    pub(crate) fn drop_permit(&self) {
        let _ = lock(&self.permit).take();
    }

    /// Requests cooperative cancellation.
    ///
    /// Idempotent: a terminal task is untouched, a repeat request changes
    /// nothing. A never-started lazy task has no body to unwind, so it
    /// settles to `Cancelled` here.
    pub(crate) fn request_cancel(&self) -> CancelOutcome {
        if self.state().is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }
        let first = !self.token.is_cancelled();
        self.token.cancel();

        let moved = self.transition_if(TaskState::New, TaskState::Cancelling)
            || self.transition_if(TaskState::Active, TaskState::Cancelling)
            || self.transition_if(TaskState::Suspended, TaskState::Cancelling);

        // A lazy task whose launch was never taken has no driver; settle it.
        if self.take_launch().is_some() {
            let _ = self.try_transition(TaskState::Cancelled);
            return CancelOutcome::CancelledUnstarted;
        }

        if moved || first {
            CancelOutcome::Requested
        } else {
            CancelOutcome::AlreadyRequested
        }
    }

    /// Cancellation request plus event publishing; shared by handles and
    /// scope-wide cancellation.
    ///
    /// Returns `true` if the task was still live when the request landed.
    pub(crate) fn cancel_with_bus(&self, bus: &Bus, reason: Option<&str>) -> bool {
        match self.request_cancel() {
            CancelOutcome::AlreadyTerminal => false,
            CancelOutcome::AlreadyRequested => true,
            CancelOutcome::Requested => {
                let mut ev = Event::new(EventKind::TaskCancelRequested)
                    .with_task(Arc::clone(&self.name))
                    .with_id(self.id);
                if let Some(r) = reason {
                    ev = ev.with_reason(r.to_string());
                }
                bus.publish(ev);
                true
            }
            CancelOutcome::CancelledUnstarted => {
                bus.publish(
                    Event::new(EventKind::TaskCancelRequested)
                        .with_task(Arc::clone(&self.name))
                        .with_id(self.id),
                );
                bus.publish(
                    Event::new(EventKind::TaskCancelled)
                        .with_task(Arc::clone(&self.name))
                        .with_id(self.id),
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> Arc<TaskCell> {
        TaskCell::new(
            Arc::from("probe"),
            ContextClass::Inherit,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_new_cell_starts_in_new() {
        let c = cell();
        assert_eq!(c.state(), TaskState::New);
        assert!(!c.cancellation_requested());
    }

    #[test]
    fn test_illegal_transition_is_reported_not_applied() {
        let c = cell();
        let err = c.try_transition(TaskState::Completed).unwrap_err();
        assert!(matches!(err, RuntimeError::InvariantViolation { .. }));
        assert_eq!(c.state(), TaskState::New);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let c = cell();
        assert!(c.try_transition(TaskState::Active).is_ok());
        assert_eq!(c.request_cancel(), CancelOutcome::Requested);
        assert_eq!(c.state(), TaskState::Cancelling);
        assert_eq!(c.request_cancel(), CancelOutcome::AlreadyRequested);
        assert_eq!(c.state(), TaskState::Cancelling);
    }

    #[test]
    fn test_cancel_on_terminal_is_noop() {
        let c = cell();
        assert!(c.try_transition(TaskState::Active).is_ok());
        assert!(c.try_transition(TaskState::Completed).is_ok());
        assert_eq!(c.request_cancel(), CancelOutcome::AlreadyTerminal);
        assert_eq!(c.state(), TaskState::Completed);
    }

    #[test]
    fn test_unstarted_lazy_cancel_settles_immediately() {
        let c = cell();
        c.store_launch(Box::new(|| {}));
        assert_eq!(c.request_cancel(), CancelOutcome::CancelledUnstarted);
        assert_eq!(c.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_settle_routes_completion_during_cancellation() {
        let c = cell();
        assert!(c.try_transition(TaskState::Active).is_ok());
        assert_eq!(c.request_cancel(), CancelOutcome::Requested);

        // the body finished its work, but cancellation was already in flight
        let applied = c.settle(TaskState::Completed, |t| {
            assert_eq!(t, TaskState::Cancelled);
        });
        assert_eq!(applied, Some(TaskState::Cancelled));
        assert_eq!(c.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_settle_keeps_fault_during_cancellation() {
        let c = cell();
        assert!(c.try_transition(TaskState::Active).is_ok());
        assert_eq!(c.request_cancel(), CancelOutcome::Requested);

        let applied = c.settle(TaskState::Failed, |_| {});
        assert_eq!(applied, Some(TaskState::Failed));
    }

    #[test]
    fn test_settle_on_terminal_cell_is_refused() {
        let c = cell();
        assert!(c.try_transition(TaskState::Active).is_ok());
        assert!(c.try_transition(TaskState::Completed).is_ok());

        let applied = c.settle(TaskState::Cancelled, |_| {
            unreachable!("fill must not run on a settled cell");
        });
        assert_eq!(applied, None);
        assert_eq!(c.state(), TaskState::Completed);
    }

    #[test]
    fn test_start_is_noop_after_launch_taken() {
        let c = cell();
        c.store_launch(Box::new(|| {}));
        assert!(c.start());
        assert!(!c.start());
    }
}
