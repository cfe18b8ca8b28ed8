//! # TaskContext: suspension primitives and cooperative cancellation.
//!
//! Every task body receives a [`TaskContext`]. It is the seam through which
//! the body talks to the scheduler: timed waits, voluntary yields, waiting on
//! other tasks, and cancellation checks.
//!
//! ## The non-blocking property
//! Each primitive here releases the task's worker permit **before** waiting
//! and reacquires it (at the back of the pool's FIFO queue) on resume. A
//! `ctx.delay(d)` therefore costs no worker for the duration of `d`; a plain
//! `tokio::time::sleep` inside a body holds the worker the whole time and
//! serializes unrelated tasks in a bounded pool. The latter is the
//! anti-pattern, not an API.
//!
//! ## Cancellation
//! Cancellation is advisory, not preemptive: it is observed here, at
//! suspension points, or via [`TaskContext::check_cancelled`]. A body that
//! never suspends and never checks is never interrupted mid-execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::dispatch::Dispatcher;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Event, EventKind};
use crate::tasks::cell::TaskCell;
use crate::tasks::{TaskHandle, TaskId, TaskState};

/// Execution context handed to every task body.
///
/// ## Example
/// ```no_run
/// use std::time::Duration;
/// use taskscope::{ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
///
/// # async fn demo() {
/// let sched = Scheduler::new(SchedulerConfig::default());
/// let scope = sched.scope(FailurePolicy::FailFast);
/// scope.spawn("ticker", ContextClass::Io, StartMode::Eager, |ctx| async move {
///     while !ctx.is_cancelled() {
///         ctx.delay(Duration::from_millis(250)).await?;
///     }
///     Ok(())
/// });
/// # }
/// ```
pub struct TaskContext {
    pub(crate) cell: Arc<TaskCell>,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl TaskContext {
    /// Id of the running task.
    pub fn id(&self) -> TaskId {
        self.cell.id()
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// True once cancellation has been requested for this task.
    pub fn is_cancelled(&self) -> bool {
        self.cell.cancellation_requested()
    }

    /// Explicit cooperative cancellation check.
    ///
    /// Returns `Err(TaskError::Cancelled)` if cancellation was requested, so
    /// a body can bail with `ctx.check_cancelled()?`.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Suspends the task for `duration` without occupying a worker.
    ///
    /// The worker permit is released for the whole wait. Cancellation is
    /// observed on entry, during the wait, and on resume.
    pub async fn delay(&self, duration: Duration) -> Result<(), TaskError> {
        self.check_cancelled()?;
        self.suspend("delay", Some(duration));

        let sleep = time::sleep(duration);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            _ = self.cell.cancelled() => {}
        }

        self.resume().await?;
        self.check_cancelled()
    }

    /// Voluntarily suspends and re-queues the task at the back of its pool's
    /// ready queue, giving other ready tasks in the same pool a turn.
    pub async fn yield_now(&self) -> Result<(), TaskError> {
        self.check_cancelled()?;
        self.suspend("yield", None);
        tokio::task::yield_now().await;
        self.resume().await?;
        self.check_cancelled()
    }

    /// Suspends the caller until `target` is terminal.
    ///
    /// Returns immediately (no suspension transition) if the target already
    /// settled. Never transitions the target itself.
    pub async fn join(&self, target: &TaskHandle) -> Result<(), TaskError> {
        if target.state().is_terminal() {
            return Ok(());
        }
        self.check_cancelled()?;
        self.suspend("join", None);

        tokio::select! {
            _ = target.cell.wait_terminal() => {}
            _ = self.cell.cancelled() => {}
        }

        self.resume().await?;
        self.check_cancelled()
    }

    /// Marks the suspension transition and frees the worker.
    fn suspend(&self, why: &'static str, wait: Option<Duration>) {
        if self
            .cell
            .transition_if(TaskState::Active, TaskState::Suspended)
        {
            let mut ev = Event::new(EventKind::TaskSuspended)
                .with_task(Arc::clone(self.cell.name()))
                .with_id(self.cell.id())
                .with_reason(why);
            if let Some(d) = wait {
                ev = ev.with_delay(d);
            }
            self.dispatcher.bus().publish(ev);
        }
        self.cell.drop_permit();
    }

    /// Re-admits the task after its suspension condition cleared.
    async fn resume(&self) -> Result<(), TaskError> {
        match self.dispatcher.resume(&self.cell).await {
            Ok(()) => Ok(()),
            // shutdown closed the pool under us; settle as cancelled
            Err(RuntimeError::PoolClosed { .. }) => Err(TaskError::Cancelled),
            Err(err) => Err(TaskError::fault(err.to_string())),
        }
    }
}
