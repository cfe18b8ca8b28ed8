//! # Dispatcher: assigns runnable tasks to execution contexts.
//!
//! The dispatcher owns one [`WorkerPool`] per bounded context class and the
//! event bus. It admits tasks into their pool, re-admits them after a
//! suspension, and guards the lifecycle invariants of both operations.
//!
//! ## Rules
//! - A task bound to context class X only ever holds a permit of pool X.
//! - `Inherit` tasks hold no permit: after a suspension they resume on
//!   whatever worker is free, with no placement guarantee.
//! - Resuming an already-terminal task is a
//!   [`RuntimeError::InvariantViolation`]: always reported (event + error),
//!   aborts only the offending operation, never the dispatcher.

use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::config::SchedulerConfig;
use crate::dispatch::pool::WorkerPool;
use crate::dispatch::ContextClass;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::cell::TaskCell;
use crate::tasks::TaskState;

/// Routes tasks to worker pools and publishes scheduling events.
pub(crate) struct Dispatcher {
    compute: WorkerPool,
    io: WorkerPool,
    bus: Bus,
}

impl Dispatcher {
    pub(crate) fn new(cfg: &SchedulerConfig, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            compute: WorkerPool::new(ContextClass::Compute, cfg.compute_workers),
            io: WorkerPool::new(ContextClass::Io, cfg.io_workers),
            bus,
        })
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    fn pool(&self, class: ContextClass) -> Option<&WorkerPool> {
        match class {
            ContextClass::Compute => Some(&self.compute),
            ContextClass::Io => Some(&self.io),
            ContextClass::Inherit => None,
        }
    }

    /// Waits for a worker slot of the given class.
    ///
    /// `Inherit` needs no slot and returns `None` immediately.
    pub(crate) async fn admit(
        &self,
        class: ContextClass,
    ) -> Result<Option<OwnedSemaphorePermit>, RuntimeError> {
        match self.pool(class) {
            Some(pool) => Ok(Some(pool.admit().await?)),
            None => Ok(None),
        }
    }

    /// Re-admits a suspended task after its suspension condition cleared.
    ///
    /// The task queues at the back of its pool's FIFO; within one pool, tasks
    /// therefore resume in the order their conditions became satisfied.
    pub(crate) async fn resume(&self, cell: &Arc<TaskCell>) -> Result<(), RuntimeError> {
        let state = cell.state();
        if state.is_terminal() {
            let detail = format!(
                "resume on terminal task {} {} (state {state})",
                cell.name(),
                cell.id()
            );
            self.bus.publish(
                Event::new(EventKind::InvariantViolated)
                    .with_task(Arc::clone(cell.name()))
                    .with_id(cell.id())
                    .with_reason(detail.clone()),
            );
            return Err(RuntimeError::InvariantViolation { detail });
        }

        if let Some(pool) = self.pool(cell.class()) {
            let permit = pool.admit().await?;
            cell.store_permit(permit);
        }

        if cell.transition_if(TaskState::Suspended, TaskState::Active) {
            self.bus.publish(
                Event::new(EventKind::TaskResumed)
                    .with_task(Arc::clone(cell.name()))
                    .with_id(cell.id()),
            );
        }
        Ok(())
    }

    /// Free worker slots in the pool of `class` (`None` for `Inherit`).
    pub(crate) fn available(&self, class: ContextClass) -> Option<usize> {
        self.pool(class).map(WorkerPool::available)
    }

    /// Closes every pool; used by scheduler shutdown.
    pub(crate) fn close_pools(&self) {
        self.compute.close();
        self.io.close();
    }
}
