//! # Task driver: runs one task body from admission to terminal state.
//!
//! The driver is the future actually spawned onto the runtime for each task.
//! It admits the task into its worker pool, runs the body with a
//! [`TaskContext`], catches panics at the task boundary, and settles the
//! terminal state.
//!
//! ## Flow
//! ```text
//! admit (pool permit, cancellable) ──► New → Active ──► body(ctx)
//!                                                        │
//!            Ok(value)          ───────────────────────► Completed
//!            Err(Cancelled)     ───────────────────────► Cancelled
//!            Err(fault) / panic ───────────────────────► Failed
//! ```
//!
//! ## Rules
//! - A panic escaping the body is caught here, stored as the `Failed`
//!   result, and never takes down the dispatcher worker.
//! - The worker permit is dropped **before** the terminal bookkeeping; the
//!   worker is free the instant the body stops executing.
//! - The fault (if any) is recorded with the owning scope **before** the
//!   state flips terminal, so a scope can never observe a terminal child
//!   whose fault is still unrecorded.
//! - The result slot is filled inside the same atomic step that flips the
//!   state, and the child is released from the scope's set only **after**
//!   the flip; `close()` never returns while a child is observably
//!   non-terminal.

use std::future::Future;
use std::sync::{Arc, PoisonError};

use futures::FutureExt;

use crate::dispatch::Dispatcher;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::scope::ScopeShared;
use crate::tasks::cell::{Launch, TaskCell};
use crate::tasks::{ResultSlot, TaskContext, TaskState};

/// Builds the launch closure for a task; invoking it spawns the driver.
///
/// Eager tasks invoke it at spawn, lazy tasks park it in the cell until
/// `start()`.
pub(crate) fn make_launch<T, F, Fut>(
    dispatcher: Arc<Dispatcher>,
    cell: Arc<TaskCell>,
    scope: Option<Arc<ScopeShared>>,
    slot: ResultSlot<T>,
    body: F,
) -> Launch
where
    T: Send + 'static,
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    Box::new(move || {
        tokio::spawn(drive(dispatcher, cell, scope, slot, body));
    })
}

/// Runs one task to its terminal state.
async fn drive<T, F, Fut>(
    dispatcher: Arc<Dispatcher>,
    cell: Arc<TaskCell>,
    scope: Option<Arc<ScopeShared>>,
    slot: ResultSlot<T>,
    body: F,
) where
    T: Send + 'static,
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    let bus = dispatcher.bus().clone();

    // Admission is a cancellable wait: a task cancelled while queueing for a
    // worker never runs its body.
    let permit = tokio::select! {
        res = dispatcher.admit(cell.class()) => match res {
            Ok(p) => p,
            Err(_closed) => {
                settle(&cell, &scope, &slot, Err(TaskError::Cancelled), &bus);
                return;
            }
        },
        _ = cell.cancelled() => {
            settle(&cell, &scope, &slot, Err(TaskError::Cancelled), &bus);
            return;
        }
    };
    if let Some(p) = permit {
        cell.store_permit(p);
    }

    if !cell.transition_if(TaskState::New, TaskState::Active) {
        // cancel landed between spawn and first poll
        cell.drop_permit();
        settle(&cell, &scope, &slot, Err(TaskError::Cancelled), &bus);
        return;
    }
    bus.publish(
        Event::new(EventKind::TaskStarted)
            .with_task(Arc::clone(cell.name()))
            .with_id(cell.id()),
    );

    let ctx = TaskContext {
        cell: Arc::clone(&cell),
        dispatcher: Arc::clone(&dispatcher),
    };
    let fut = (body)(ctx);
    let outcome = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(TaskError::fault(panic_message(panic))),
    };

    // worker becomes free immediately
    cell.drop_permit();
    settle(&cell, &scope, &slot, outcome, &bus);
}

/// Records any fault with the scope, settles the terminal state, and
/// releases the child.
fn settle<T>(
    cell: &Arc<TaskCell>,
    scope: &Option<Arc<ScopeShared>>,
    slot: &ResultSlot<T>,
    outcome: Result<T, TaskError>,
    bus: &Bus,
) {
    let (desired, fault) = match &outcome {
        Ok(_) => (TaskState::Completed, None),
        Err(e) if e.is_cancellation() => (TaskState::Cancelled, None),
        // a genuine fault, even during cleanup, is never swallowed
        Err(e) => (TaskState::Failed, Some(e.clone())),
    };

    // policy runs while the child is still live and non-terminal, so close()
    // cannot race past an unrecorded fault
    if let (Some(scope), Some(f)) = (scope.as_ref(), fault.as_ref()) {
        scope.on_child_fault(cell, f);
    }

    // the slot is filled and the terminal state applied in one atomic step;
    // a concurrent cancel() either lands before it (Completed becomes
    // Cancelled) or finds the cell already settled
    let applied = cell.settle(desired, |terminal| {
        let stored = match (terminal, outcome) {
            (TaskState::Completed, Ok(v)) => Ok(v),
            (TaskState::Failed, Err(e)) => Err(e),
            _ => Err(TaskError::Cancelled),
        };
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(stored);
    });

    let Some(terminal) = applied else {
        bus.publish(
            Event::new(EventKind::InvariantViolated)
                .with_task(Arc::clone(cell.name()))
                .with_id(cell.id())
                .with_reason(format!(
                    "cannot settle task in {desired}: already {}",
                    cell.state()
                )),
        );
        return;
    };

    // the child leaves the scope's set only after its state is terminal
    if let Some(scope) = scope {
        scope.release_child(cell.id());
    }

    let kind = match terminal {
        TaskState::Completed => EventKind::TaskCompleted,
        TaskState::Failed => EventKind::TaskFailed,
        _ => EventKind::TaskCancelled,
    };
    let mut ev = Event::new(kind)
        .with_task(Arc::clone(cell.name()))
        .with_id(cell.id())
        .with_state(terminal);
    if let Some(f) = fault {
        ev = ev.with_reason(f.to_string());
    }
    bus.publish(ev);
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: <non-string payload>".to_string()
    }
}
