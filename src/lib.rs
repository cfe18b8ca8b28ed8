//! # taskscope
//!
//! **Taskscope** is a cooperative structured-concurrency scheduler for Rust.
//!
//! It provides primitives to spawn async tasks into scopes that own them,
//! suspend them without occupying a worker, cancel them cooperatively, and
//! collect their results. The crate is designed as a building block for
//! pipelines and job runners that need bounded parallelism with structured
//! ownership.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  task body   │   │  task body   │   │  task body   │
//!     │ (user fn #1) │   │ (user fn #2) │   │ (user fn #3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (runtime root)                                         │
//! │  - Dispatcher (worker pool per execution context)                 │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - root CancellationToken (every scope descends from it)          │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │    Scope     │   │    Scope     │   │    Scope     │   │
//!     │ (child set + │   │ (child set + │   │ (child set + │   │
//!     │  policy)     │   │  policy)     │   │  policy)     │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │                  │                  │                 │
//!      │ Publishes        │ Publishes        │ Publishes       │
//!      │ Events:          │ Events:          │ Events:         │
//!      │ - TaskSpawned    │ - TaskSuspended  │ - ScopeClosing  │
//!      │ - TaskStarted    │ - TaskResumed    │ - FaultIsolated │
//!      │ - TaskFailed     │ - TaskCancelled  │ - ...           │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: SchedulerConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber listener   │
//!                       │    (in Scheduler)      │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! scope.spawn(name, class, mode, body)
//!
//!   ├─► Eager: driver spawned now    Lazy: parked until start()
//!   ├─► admit into the class's worker pool (FIFO, cancellable wait)
//!   ├─► New → Active, publish TaskStarted
//!   ├─► body(ctx) runs
//!   │     │
//!   │     ├─ ctx.delay(d) / ctx.yield_now() / ctx.join(h):
//!   │     │     Active → Suspended, worker permit RELEASED,
//!   │     │     wait (cancellable), re-admit at back of pool FIFO,
//!   │     │     Suspended → Active
//!   │     │
//!   │     ├─ Ok(value)       ──► Completed
//!   │     ├─ Err(Cancelled)  ──► Cancelled
//!   │     └─ Err(fault)/panic ─► Failed  (panic caught at the boundary)
//!   │
//!   └─► settle: fill result slot → notify scope → flip terminal state
//!
//! Scope policy on a Failed child:
//!   - FailFast:        cancel all siblings; close() reports the first fault
//!   - IsolateFailures: record + hand to on_fault handler; siblings unaffected
//! ```
//!
//! ## Features
//! | Area              | Description                                                          | Key types / traits                    |
//! |-------------------|----------------------------------------------------------------------|---------------------------------------|
//! | **Scopes**        | Structured ownership: spawn, await-all, cancel-all, close.           | [`Scope`], [`FailurePolicy`]          |
//! | **Suspension**    | Timed waits and yields that never occupy a worker.                   | [`TaskContext`]                       |
//! | **Dispatch**      | Bounded worker pools per execution context.                          | [`ContextClass`], [`SchedulerConfig`] |
//! | **Handles**       | Join, cancel, and typed result retrieval.                            | [`TaskHandle`], [`ResultHandle`]      |
//! | **Combinators**   | Gather and race groups of result handles.                            | [`gather_all`], [`race_first`]        |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom subscribers).   | [`Subscribe`]                         |
//! | **Errors**        | Typed errors for task outcomes and scheduler invariants.             | [`TaskError`], [`RuntimeError`]       |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskscope::{ContextClass, FailurePolicy, Scheduler, SchedulerConfig, StartMode};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SchedulerConfig::default();
//!     cfg.compute_workers = 2;
//!
//!     let sched = Scheduler::new(cfg);
//!     let scope = sched.scope(FailurePolicy::FailFast);
//!
//!     // A worker that waits without holding its pool slot.
//!     let fetch = scope.spawn_with_result(
//!         "fetch",
//!         ContextClass::Io,
//!         StartMode::Eager,
//!         |ctx| async move {
//!             ctx.delay(Duration::from_millis(10)).await?;
//!             Ok("payload")
//!         },
//!     );
//!
//!     assert_eq!(fetch.value().await?, "payload");
//!     scope.close().await?;
//!     sched.shutdown();
//!     Ok(())
//! }
//! ```
mod combine;
mod config;
mod dispatch;
mod error;
mod events;
mod scheduler;
mod scope;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use combine::{gather_all, race_first};
pub use config::SchedulerConfig;
pub use dispatch::ContextClass;
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use scheduler::Scheduler;
pub use scope::{FailurePolicy, Scope, ScopeState, StartMode};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{ResultHandle, TaskContext, TaskHandle, TaskId, TaskState};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
