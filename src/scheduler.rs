//! # Scheduler: the runtime root.
//!
//! The [`Scheduler`] owns the dispatcher (worker pools + event bus) and the
//! root cancellation token every scope descends from. It is the only entry
//! point for creating scopes.
//!
//! ## Shutdown
//! `shutdown()` cancels the root token (every scope and task observes it
//! cooperatively) and closes the worker pools, so suspended tasks that try to
//! resume settle as cancelled instead of queueing forever.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::dispatch::Dispatcher;
use crate::events::{Bus, Event, EventKind};
use crate::scope::{FailurePolicy, Scope};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Root of the task runtime.
///
/// ## Example
/// ```no_run
/// use taskscope::{ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
///
/// # async fn demo() -> Result<(), taskscope::TaskError> {
/// let sched = Scheduler::new(SchedulerConfig::default());
/// let scope = sched.scope(FailurePolicy::FailFast);
/// scope.spawn("job", ContextClass::Compute, StartMode::Eager, |_ctx| async move { Ok(()) });
/// scope.close().await?;
/// sched.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    cfg: SchedulerConfig,
    dispatcher: Arc<Dispatcher>,
    root: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler with no event subscribers.
    pub fn new(cfg: SchedulerConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let dispatcher = Dispatcher::new(&cfg, bus);
        Self {
            cfg,
            dispatcher,
            root: CancellationToken::new(),
        }
    }

    /// Creates a scheduler and wires the given subscribers to the event bus.
    ///
    /// Spawns a listener task that forwards every bus event to the
    /// [`SubscriberSet`]; must be called from within a tokio runtime. The
    /// listener drains until `shutdown()` cancels the root token, then shuts
    /// the set down.
    pub fn with_subscribers(cfg: SchedulerConfig, subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let sched = Self::new(cfg);
        let set = SubscriberSet::new(subs, sched.dispatcher.bus().clone());
        let mut rx = sched.dispatcher.bus().subscribe();
        let stop = sched.root.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => {
                            set.emit(
                                &Event::new(EventKind::SubscriberOverflow)
                                    .with_reason(format!("listener lagged, skipped {n} events")),
                            );
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            set.shutdown().await;
        });
        sched
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    /// The event bus; subscribe for lifecycle events.
    pub fn bus(&self) -> &Bus {
        self.dispatcher.bus()
    }

    /// Opens a top-level scope under the root token.
    pub fn scope(&self, policy: FailurePolicy) -> Scope {
        Scope::new(
            Arc::clone(&self.dispatcher),
            &self.root,
            self.root.clone(),
            policy,
        )
    }

    /// Cancels the root token and closes the worker pools.
    ///
    /// Cooperative: running bodies observe cancellation at their next
    /// suspension point or check, suspended tasks fail their re-admission and
    /// settle as cancelled.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.dispatcher.close_pools();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::dispatch::ContextClass;
    use crate::scope::StartMode;
    use crate::tasks::TaskState;

    #[derive(Default)]
    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    #[tokio::test]
    async fn test_subscriber_listener_forwards_events() {
        let counter = Arc::new(Counter::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::clone(&counter) as _];
        let sched = Scheduler::with_subscribers(SchedulerConfig::default(), subs);

        let scope = sched.scope(FailurePolicy::FailFast);
        let h = scope.spawn("observed", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Ok(())
        });
        h.join().await;
        scope.close().await.unwrap();

        // give the listener a beat to drain its queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(counter.seen.load(Ordering::SeqCst) > 0);
        sched.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_tasks() {
        let sched = Scheduler::new(SchedulerConfig::default());
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn("long", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_secs(3600)).await?;
            Ok(())
        });
        tokio::task::yield_now().await;

        sched.shutdown();
        h.join().await;
        assert_eq!(h.state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_scope_after_shutdown_spawns_cancelled_work() {
        let sched = Scheduler::new(SchedulerConfig::default());
        sched.shutdown();

        // the root token is already cancelled, so the body observes it on its
        // first check
        let scope = sched.scope(FailurePolicy::FailFast);
        let h = scope.spawn("late", ContextClass::Inherit, StartMode::Eager, |ctx| async move {
            ctx.check_cancelled()?;
            Ok(())
        });
        h.join().await;
        assert_eq!(h.state(), TaskState::Cancelled);
        scope.close().await.unwrap();
    }
}
