//! # WorkerPool: a bounded pool of workers for one execution context.
//!
//! A pool is a FIFO-fair semaphore: each permit is one worker slot. A task
//! holds a permit only while actively executing; every suspension primitive
//! releases the permit before waiting and queues for a fresh one on resume.
//!
//! ## Fairness
//! tokio's semaphore hands out permits in request order, so within one pool
//! ready tasks are served FIFO — tasks resume in the order their suspension
//! condition became satisfied, and no ready task starves while others are
//! repeatedly preferred.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::dispatch::ContextClass;
use crate::error::RuntimeError;

/// Bounded worker pool for one [`ContextClass`].
pub(crate) struct WorkerPool {
    class: ContextClass,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool with `capacity` worker slots (clamped to >= 1).
    pub(crate) fn new(class: ContextClass, capacity: usize) -> Self {
        Self {
            class,
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Waits for a free worker slot (FIFO order).
    ///
    /// Fails only when the pool has been closed by scheduler shutdown.
    pub(crate) async fn admit(&self) -> Result<OwnedSemaphorePermit, RuntimeError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_closed| RuntimeError::PoolClosed {
                context: self.class,
            })
    }

    /// Closes the pool; pending and future admissions fail.
    pub(crate) fn close(&self) {
        self.semaphore.close();
    }

    /// Number of currently free worker slots.
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admission_consumes_a_slot() {
        let pool = WorkerPool::new(ContextClass::Compute, 2);
        let permit = pool.admit().await.expect("slot");
        assert_eq!(pool.available(), 1);
        drop(permit);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_admission() {
        let pool = WorkerPool::new(ContextClass::Io, 1);
        pool.close();
        let err = pool.admit().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::PoolClosed {
                context: ContextClass::Io
            }
        ));
    }

    #[test]
    fn test_capacity_is_clamped() {
        let pool = WorkerPool::new(ContextClass::Compute, 0);
        assert_eq!(pool.available(), 1);
    }
}
