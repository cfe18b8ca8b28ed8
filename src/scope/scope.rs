//! # Scope: the structured-concurrency container.
//!
//! A scope owns a set of child tasks and enforces the structured completion
//! rules: it reaches `Closed` only after every child is terminal, it
//! propagates cancellation strictly downward, and it applies its
//! [`FailurePolicy`] when a child faults.
//!
//! ## High-level architecture
//! ```text
//! Scheduler ──► Scope (root token child)
//!                 │
//!                 ├─ spawn(..) ───────► TaskCell + driver (child token)
//!                 ├─ spawn_detached(..) ► TaskCell + driver (root token — never
//!                 │                       awaited, never cancelled by close)
//!                 ├─ child(policy) ────► nested Scope (token child ⇒ downward
//!                 │                       cancellation)
//!                 │
//!                 ├─ await_all_children(): loop until the live-child set is
//!                 │     empty (children spawned before it resolves are
//!                 │     covered; children spawned after are not)
//!                 ├─ cancel_all(cause): Closing → cancel every child → await
//!                 └─ close(): await children → Closed → report first fault
//!                                                       (FailFast only)
//! ```
//!
//! ## Rules
//! - The child set is mutated only by `spawn` and by terminal transitions of
//!   children; both are serialized by one mutex (no lost updates when many
//!   tasks terminate concurrently).
//! - FailFast: the first `Failed` child cancels all siblings; `close()`
//!   reports exactly that one fault.
//! - IsolateFailures: faults go to the `on_fault` handler and the bus;
//!   siblings and the scope itself are unaffected.
//! - Cancellation never propagates upward; a parent learns of child faults
//!   only through the fault-reporting channel (`close()` / handler / events).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::dispatch::{make_launch, ContextClass, Dispatcher};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::scope::{FailurePolicy, ScopeState, StartMode};
use crate::tasks::cell::TaskCell;
use crate::tasks::{ResultHandle, ResultSlot, TaskContext, TaskHandle, TaskId, TaskState};

type FaultHandler = Box<dyn Fn(TaskId, &TaskError) + Send + Sync>;

fn lock<'a, T>(m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state behind a [`Scope`]; the task driver holds it to report
/// terminal transitions back.
pub(crate) struct ScopeShared {
    policy: FailurePolicy,
    state: Mutex<ScopeState>,
    children: Mutex<HashMap<TaskId, Arc<TaskCell>>>,
    first_fault: Mutex<Option<TaskError>>,
    fault_handler: Mutex<Option<FaultHandler>>,
    /// Scope token; child tasks and nested scopes derive from it, so
    /// cancellation flows downward only.
    token: CancellationToken,
    /// Scheduler root token; detached tasks derive from it instead.
    root: CancellationToken,
    dispatcher: Arc<Dispatcher>,
}

impl ScopeShared {
    /// Applies the failure policy for a faulting child.
    ///
    /// Called by the task driver *before* the child's state flips terminal,
    /// so `close()` can never race past an unrecorded fault.
    pub(crate) fn on_child_fault(&self, cell: &Arc<TaskCell>, fault: &TaskError) {
        match self.policy {
            FailurePolicy::FailFast => {
                let mut first = lock(&self.first_fault);
                if first.is_none() {
                    *first = Some(fault.clone());
                    drop(first);
                    self.begin_closing(Some(&format!("child fault: {fault}")));
                    self.cancel_children("sibling fault", Some(cell.id()));
                }
            }
            FailurePolicy::IsolateFailures => {
                if let Some(handler) = lock(&self.fault_handler).as_ref() {
                    handler(cell.id(), fault);
                }
                self.dispatcher.bus().publish(
                    Event::new(EventKind::FaultIsolated)
                        .with_task(Arc::clone(cell.name()))
                        .with_id(cell.id())
                        .with_reason(fault.to_string()),
                );
            }
        }
    }

    /// Drops a settled child from the live set.
    ///
    /// Called by the task driver *after* the child's state flipped terminal;
    /// until then the child stays visible to `await_all_children`.
    pub(crate) fn release_child(&self, id: TaskId) {
        lock(&self.children).remove(&id);
    }

    fn begin_closing(&self, reason: Option<&str>) {
        {
            let mut st = lock(&self.state);
            if *st != ScopeState::Open {
                return;
            }
            *st = ScopeState::Closing;
        }
        let mut ev = Event::new(EventKind::ScopeClosing);
        if let Some(r) = reason {
            ev = ev.with_reason(r.to_string());
        }
        self.dispatcher.bus().publish(ev);
    }

    fn cancel_children(&self, reason: &str, except: Option<TaskId>) {
        // scope token first: nested scopes and suspended children observe it
        self.token.cancel();
        let snapshot: Vec<Arc<TaskCell>> = lock(&self.children).values().cloned().collect();
        for cell in snapshot {
            if Some(cell.id()) == except {
                continue;
            }
            cell.cancel_with_bus(self.dispatcher.bus(), Some(reason));
        }
    }

    async fn await_all_children(&self) {
        loop {
            let pending: Vec<Arc<TaskCell>> = {
                let mut kids = lock(&self.children);
                kids.retain(|_, c| !c.state().is_terminal());
                kids.values().cloned().collect()
            };
            if pending.is_empty() {
                return;
            }
            for cell in &pending {
                // structural completion must not deadlock on a lazy child
                // nobody started
                cell.start();
                cell.wait_terminal().await;
            }
        }
    }
}

/// Ownership boundary that tracks, awaits, and collectively cancels a set of
/// tasks.
///
/// ## Example
/// ```no_run
/// use taskscope::{ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
///
/// # async fn demo() -> Result<(), taskscope::TaskError> {
/// let sched = Scheduler::new(SchedulerConfig::default());
/// let scope = sched.scope(FailurePolicy::FailFast);
///
/// let sum = scope.spawn_with_result("sum", ContextClass::Compute, StartMode::Eager,
///     |_ctx| async move { Ok(2 + 2) });
///
/// assert_eq!(sum.value().await?, 4);
/// scope.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Scope {
    shared: Arc<ScopeShared>,
}

impl Scope {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        parent: &CancellationToken,
        root: CancellationToken,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            shared: Arc::new(ScopeShared {
                policy,
                state: Mutex::new(ScopeState::Open),
                children: Mutex::new(HashMap::new()),
                first_fault: Mutex::new(None),
                fault_handler: Mutex::new(None),
                token: parent.child_token(),
                root,
                dispatcher,
            }),
        }
    }

    /// The scope's failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.shared.policy
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScopeState {
        *lock(&self.shared.state)
    }

    /// Number of live (non-terminal) children.
    pub fn child_count(&self) -> usize {
        lock(&self.shared.children).len()
    }

    /// Registers the fault handler consulted under
    /// [`FailurePolicy::IsolateFailures`].
    pub fn on_fault(&self, handler: impl Fn(TaskId, &TaskError) + Send + Sync + 'static) {
        *lock(&self.shared.fault_handler) = Some(Box::new(handler));
    }

    /// Creates a nested scope whose cancellation derives from this one
    /// (downward propagation only).
    pub fn child(&self, policy: FailurePolicy) -> Scope {
        Scope::new(
            Arc::clone(&self.shared.dispatcher),
            &self.shared.token,
            self.shared.root.clone(),
            policy,
        )
    }

    /// Spawns a child task with no interesting result value.
    ///
    /// The body receives a [`TaskContext`] for suspension and cancellation
    /// checks. `mode` picks eager or lazy start.
    pub fn spawn<F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        class: ContextClass,
        mode: StartMode,
        body: F,
    ) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let (handle, _slot) = self.spawn_inner::<(), _, _>(name.into(), class, mode, body);
        handle
    }

    /// Like [`Scope::spawn`], but the handle exposes the computed value via
    /// [`ResultHandle::value`].
    pub fn spawn_with_result<T, F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        class: ContextClass,
        mode: StartMode,
        body: F,
    ) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let (handle, slot) = self.spawn_inner::<T, _, _>(name.into(), class, mode, body);
        ResultHandle::new(handle, slot)
    }

    /// Spawns an independent task: never implicitly awaited and never
    /// cancelled when this scope closes. The caller must join it manually.
    pub fn spawn_detached<F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        class: ContextClass,
        body: F,
    ) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let name: Arc<str> = name.into();
        let bus = self.shared.dispatcher.bus().clone();
        let cell = TaskCell::new(Arc::clone(&name), class, self.shared.root.child_token());
        let handle = TaskHandle::new(Arc::clone(&cell), bus.clone());
        let slot: ResultSlot<()> = Arc::new(Mutex::new(None));

        bus.publish(
            Event::new(EventKind::TaskSpawned)
                .with_task(name)
                .with_id(cell.id())
                .with_context(class),
        );
        let launch = make_launch(
            Arc::clone(&self.shared.dispatcher),
            cell,
            None,
            slot,
            body,
        );
        launch();
        handle
    }

    fn spawn_inner<T, F, Fut>(
        &self,
        name: Arc<str>,
        class: ContextClass,
        mode: StartMode,
        body: F,
    ) -> (TaskHandle, ResultSlot<T>)
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let bus = self.shared.dispatcher.bus().clone();
        let cell = TaskCell::new(Arc::clone(&name), class, self.shared.token.child_token());
        let handle = TaskHandle::new(Arc::clone(&cell), bus.clone());
        let slot: ResultSlot<T> = Arc::new(Mutex::new(None));

        // a closing scope refuses new children: immediately-cancelled task
        if self.state() != ScopeState::Open {
            let _ = cell.settle(TaskState::Cancelled, |_| {});
            bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_task(name)
                    .with_id(cell.id())
                    .with_reason("scope closed"),
            );
            return (handle, slot);
        }

        bus.publish(
            Event::new(EventKind::TaskSpawned)
                .with_task(name)
                .with_id(cell.id())
                .with_context(class),
        );

        let launch = make_launch(
            Arc::clone(&self.shared.dispatcher),
            Arc::clone(&cell),
            Some(Arc::clone(&self.shared)),
            Arc::clone(&slot),
            body,
        );
        match mode {
            StartMode::Lazy => {
                cell.store_launch(launch);
                lock(&self.shared.children).insert(cell.id(), Arc::clone(&cell));
            }
            StartMode::Eager => {
                lock(&self.shared.children).insert(cell.id(), Arc::clone(&cell));
                launch();
            }
        }
        (handle, slot)
    }

    /// Suspends until every current child is terminal.
    ///
    /// Children spawned before this resolves are included; children spawned
    /// after it resolves are not retroactively covered.
    pub async fn await_all_children(&self) {
        self.shared.await_all_children().await;
    }

    /// Marks the scope `Closing`, requests cancellation on every non-terminal
    /// child (and nested scope), then waits like
    /// [`Scope::await_all_children`].
    pub async fn cancel_all(&self, cause: &str) {
        self.shared.begin_closing(Some(cause));
        self.shared.cancel_children(cause, None);
        self.shared.await_all_children().await;
    }

    /// Structural exit: waits for every child, settles the scope in
    /// `Closed`, and reports the first fail-fast fault upward.
    ///
    /// Under [`FailurePolicy::IsolateFailures`] this always returns `Ok` —
    /// faults were already delivered to the handler.
    pub async fn close(self) -> Result<(), TaskError> {
        self.shared.await_all_children().await;
        *lock(&self.shared.state) = ScopeState::Closed;
        self.shared
            .dispatcher
            .bus()
            .publish(Event::new(EventKind::ScopeClosed));
        match lock(&self.shared.first_fault).take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::Scheduler;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_close_waits_for_children() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        scope.spawn("worker", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_millis(10)).await?;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        scope.close().await.unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_scope_closes_clean() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);
        assert_eq!(scope.state(), ScopeState::Open);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_fast_cancels_siblings_and_reports_one_fault() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let slow = scope.spawn("slow", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_secs(3600)).await?;
            Ok(())
        });
        scope.spawn("bad", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Err(TaskError::fault("boom"))
        });

        let err = scope.close().await.unwrap_err();
        assert_eq!(err, TaskError::fault("boom"));
        assert_eq!(slow.state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_isolate_failures_keeps_siblings_running() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);
        let faults = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&faults);
        scope.on_fault(move |_id, err| {
            assert!(!err.is_cancellation());
            seen.fetch_add(1, Ordering::SeqCst);
        });

        scope.spawn("bad", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Err(TaskError::fault("boom"))
        });
        let ok = scope.spawn("good", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_millis(10)).await?;
            Ok(())
        });

        // isolation: the scope closes clean, the sibling finished its work
        scope.close().await.unwrap();
        assert_eq!(ok.state(), TaskState::Completed);
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lazy_task_stays_new_until_started() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn("lazy", ContextClass::Compute, StartMode::Lazy, |_ctx| async move {
            Ok(())
        });
        tokio::task::yield_now().await;
        assert_eq!(h.state(), TaskState::New);

        assert!(h.start());
        h.join().await;
        assert_eq!(h.state(), TaskState::Completed);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_starts_unstarted_lazy_children() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn("lazy", ContextClass::Compute, StartMode::Lazy, |_ctx| async move {
            Ok(())
        });

        // structural completion must not hang on a child nobody started
        scope.close().await.unwrap();
        assert_eq!(h.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_unstarted_lazy_settles_immediately() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn("lazy", ContextClass::Compute, StartMode::Lazy, |_ctx| async move {
            Ok(())
        });
        assert!(h.cancel());
        assert_eq!(h.state(), TaskState::Cancelled);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_after_cancel_all_is_refused() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);
        scope.cancel_all("test teardown").await;
        assert_eq!(scope.state(), ScopeState::Closing);

        let h = scope.spawn("late", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Ok(())
        });
        assert_eq!(h.state(), TaskState::Cancelled);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_all_drains_suspended_children() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn("parked", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_secs(3600)).await?;
            Ok(())
        });
        tokio::task::yield_now().await;

        scope.cancel_all("shutdown").await;
        assert_eq!(h.state(), TaskState::Cancelled);
        assert_eq!(scope.child_count(), 0);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_await_all_children_covers_only_prior_spawns() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        scope.spawn("early", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Ok(())
        });
        scope.await_all_children().await;
        assert_eq!(scope.child_count(), 0);

        // a later spawn is not retroactively covered by the earlier wait
        let late = scope.spawn("late", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_secs(3600)).await?;
            Ok(())
        });
        tokio::task::yield_now().await;
        assert!(!late.state().is_terminal());
        assert_eq!(scope.child_count(), 1);

        scope.cancel_all("cleanup").await;
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_propagates_to_nested_scopes() {
        let sched = scheduler();
        let parent = sched.scope(FailurePolicy::FailFast);
        let nested = parent.child(FailurePolicy::FailFast);

        let h = nested.spawn("deep", ContextClass::Io, StartMode::Eager, |ctx| async move {
            ctx.delay(Duration::from_secs(3600)).await?;
            Ok(())
        });
        tokio::task::yield_now().await;

        // downward only: the parent's cancellation reaches the nested child
        parent.cancel_all("parent stop").await;
        h.join().await;
        assert_eq!(h.state(), TaskState::Cancelled);
        nested.close().await.unwrap();
        parent.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_detached_task_outlives_scope_cancellation() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let h = scope.spawn_detached("side", ContextClass::Io, |ctx| async move {
            ctx.delay(Duration::from_millis(10)).await?;
            Ok(())
        });

        scope.cancel_all("stop owned work").await;
        scope.close().await.unwrap();

        // the detached task was neither awaited nor cancelled by the scope
        h.join().await;
        assert_eq!(h.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_racing_a_finishing_body_still_settles() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);
        let gate = Arc::new(tokio::sync::Notify::new());

        // the body ignores cancellation and runs to its normal end
        let h = scope.spawn("stubborn", ContextClass::Io, StartMode::Eager, {
            let gate = Arc::clone(&gate);
            move |_ctx| async move {
                gate.notified().await;
                Ok(())
            }
        });
        tokio::task::yield_now().await;

        h.cancel();
        assert_eq!(h.state(), TaskState::Cancelling);
        gate.notify_one();

        // join must resolve: the completed-under-cancellation body settles
        // as Cancelled, never wedges in Cancelling
        h.join().await;
        assert_eq!(h.state(), TaskState::Cancelled);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_during_cancellation_is_not_swallowed() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);
        let gate = Arc::new(tokio::sync::Notify::new());

        let h = scope.spawn("late-fault", ContextClass::Io, StartMode::Eager, {
            let gate = Arc::clone(&gate);
            move |_ctx| async move {
                gate.notified().await;
                Err(TaskError::fault("cleanup broke"))
            }
        });
        tokio::task::yield_now().await;

        h.cancel();
        gate.notify_one();
        h.join().await;
        assert_eq!(h.state(), TaskState::Failed);
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_and_pool_survives() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        scope.spawn("explodes", ContextClass::Compute, StartMode::Eager, |_ctx| async move {
            panic!("kaboom")
        });
        let err = scope.close().await.unwrap_err();
        assert!(err.to_string().contains("kaboom"));

        // the worker that ran the panicking body is still usable
        let next = sched.scope(FailurePolicy::FailFast);
        let h = next.spawn("after", ContextClass::Compute, StartMode::Eager, |_ctx| async move {
            Ok(())
        });
        h.join().await;
        assert_eq!(h.state(), TaskState::Completed);
        next.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_value_reraises_stored_fault() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::IsolateFailures);

        let h = scope.spawn_with_result("bad", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Err::<u32, _>(TaskError::fault("no luck"))
        });
        assert_eq!(h.value().await.unwrap_err(), TaskError::fault("no luck"));
        scope.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_join_on_terminal_task_returns_immediately() {
        let sched = scheduler();
        let scope = sched.scope(FailurePolicy::FailFast);

        let done = scope.spawn("quick", ContextClass::Io, StartMode::Eager, |_ctx| async move {
            Ok(())
        });
        done.join().await;

        let waiter = scope.spawn("waiter", ContextClass::Io, StartMode::Eager, {
            let done = done.clone();
            move |ctx| async move {
                ctx.join(&done).await?;
                Ok(())
            }
        });
        waiter.join().await;
        assert_eq!(waiter.state(), TaskState::Completed);
        scope.close().await.unwrap();
    }
}
