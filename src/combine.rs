//! # Combinators over groups of result handles.
//!
//! [`gather_all`] and [`race_first`] are derived operations: they are built
//! entirely on the public handle surface (`join`, `cancel`, `value`) and hold
//! no scheduler state of their own.
//!
//! ## Rules
//! - `gather_all` waits in *completion* order but returns values in *input*
//!   order; the first fault cancels every still-live sibling.
//! - `race_first` resolves with the first task to settle, then cancels the
//!   losers. Losers are cancelled, not awaited.

use futures::future::select_all;

use crate::error::TaskError;
use crate::tasks::{ResultHandle, TaskState};

/// Waits for every handle and collects the values in input order.
///
/// Fail-fast: as soon as one task settles with an error (fault or
/// cancellation), the remaining handles are cancelled and that error is
/// returned. An empty input yields an empty `Vec`.
///
/// ## Example
/// ```no_run
/// use taskscope::{gather_all, ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
///
/// # async fn demo() -> Result<(), taskscope::TaskError> {
/// let sched = Scheduler::new(SchedulerConfig::default());
/// let scope = sched.scope(FailurePolicy::IsolateFailures);
/// let handles: Vec<_> = (0..4)
///     .map(|i| {
///         scope.spawn_with_result("square", ContextClass::Compute, StartMode::Eager,
///             move |_ctx| async move { Ok(i * i) })
///     })
///     .collect();
/// assert_eq!(gather_all(handles).await?, vec![0, 1, 4, 9]);
/// # Ok(())
/// # }
/// ```
pub async fn gather_all<T>(handles: Vec<ResultHandle<T>>) -> Result<Vec<T>, TaskError>
where
    T: Send + 'static,
{
    if handles.is_empty() {
        return Ok(Vec::new());
    }

    // Wait in completion order so a late fault cannot hide behind an
    // earlier still-running sibling.
    let mut waiting: Vec<_> = handles
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let handle = h.handle().clone();
            Box::pin(async move {
                handle.join().await;
                i
            })
        })
        .collect();
    let mut trigger = None;
    while !waiting.is_empty() {
        let (done, _, rest) = select_all(waiting).await;
        waiting = rest;
        if handles[done].state() != TaskState::Completed {
            trigger = Some(done);
            break;
        }
    }
    if trigger.is_some() {
        for h in &handles {
            h.cancel();
        }
    }

    let mut results = Vec::with_capacity(handles.len());
    for h in handles {
        results.push(h.value().await);
    }

    // the error that started the teardown wins over the cancellations it
    // caused in the siblings
    if let Some(t) = trigger {
        if let Err(e) = results.swap_remove(t) {
            return Err(e);
        }
    }
    let mut values = Vec::with_capacity(results.len());
    for res in results {
        values.push(res?);
    }
    Ok(values)
}

/// Resolves with the outcome of the first handle to settle and cancels the
/// rest.
///
/// The winner's fault or cancellation is returned as-is. Passing an empty
/// vector is a caller bug and yields [`TaskError::Cancelled`].
pub async fn race_first<T>(handles: Vec<ResultHandle<T>>) -> Result<T, TaskError>
where
    T: Send + 'static,
{
    if handles.is_empty() {
        return Err(TaskError::Cancelled);
    }

    let waiting: Vec<_> = handles
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let handle = h.handle().clone();
            Box::pin(async move {
                handle.join().await;
                i
            })
        })
        .collect();
    let (winner, _, _) = select_all(waiting).await;

    let mut result = None;
    for (i, h) in handles.into_iter().enumerate() {
        if i == winner {
            result = Some(h);
        } else {
            h.cancel();
        }
    }
    match result {
        Some(h) => h.value().await,
        // winner index always comes from the enumeration above
        None => Err(TaskError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::dispatch::ContextClass;
    use crate::scheduler::Scheduler;
    use crate::scope::{FailurePolicy, StartMode};

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_gather_all_preserves_input_order() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);

        let handles: Vec<_> = [30u64, 10, 20]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| {
                scope.spawn_with_result(
                    "staggered",
                    ContextClass::Io,
                    StartMode::Eager,
                    move |ctx| async move {
                        ctx.delay(Duration::from_millis(ms)).await?;
                        Ok(i)
                    },
                )
            })
            .collect();

        // completion order is 1, 2, 0; values still come back as 0, 1, 2
        assert_eq!(gather_all(handles).await.unwrap(), vec![0, 1, 2]);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_gather_all_fault_cancels_siblings() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);

        let slow = scope.spawn_with_result(
            "slow",
            ContextClass::Io,
            StartMode::Eager,
            |ctx| async move {
                ctx.delay(Duration::from_secs(60)).await?;
                Ok(1)
            },
        );
        let bad = scope.spawn_with_result(
            "bad",
            ContextClass::Io,
            StartMode::Eager,
            |_ctx| async move { Err::<i32, _>(TaskError::fault("broken")) },
        );

        let err = gather_all(vec![slow, bad]).await.unwrap_err();
        assert_eq!(err, TaskError::fault("broken"));
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_race_first_cancels_losers() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);

        let fast = scope.spawn_with_result(
            "fast",
            ContextClass::Io,
            StartMode::Eager,
            |_ctx| async move { Ok("fast") },
        );
        let slow = scope.spawn_with_result(
            "slow",
            ContextClass::Io,
            StartMode::Eager,
            |ctx| async move {
                ctx.delay(Duration::from_secs(60)).await?;
                Ok("slow")
            },
        );

        assert_eq!(race_first(vec![fast, slow]).await.unwrap(), "fast");
        // the loser was cancelled, so the scope drains promptly
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_gather_all_empty_input() {
        let out: Vec<i32> = gather_all(Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
