//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] forwards lifecycle events to the [`log`] facade in a
//! human-readable format. This is primarily useful for development,
//! debugging, and examples.
//!
//! ## Output format
//! ```text
//! [spawned] task=worker #3 context=compute
//! [suspended] task=worker #3 reason=delay delay_ms=1000
//! [failed] task=worker #3 reason="connection refused"
//! [scope-closing] reason="sibling fault"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple log-facade subscriber.
///
/// Enabled via the `logging` feature. Emits human-readable event lines at
/// `info` level (`warn` for faults and invariant violations).
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

fn fmt_task(e: &Event) -> String {
    match (&e.task, e.task_id) {
        (Some(name), Some(id)) => format!("task={name} {id}"),
        (Some(name), None) => format!("task={name}"),
        (None, Some(id)) => format!("task={id}"),
        (None, None) => String::new(),
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let who = fmt_task(e);
        match e.kind {
            EventKind::TaskSpawned => {
                log::info!("[spawned] {who} context={:?}", e.context);
            }
            EventKind::TaskStarted => log::info!("[started] {who}"),
            EventKind::TaskSuspended => {
                log::info!(
                    "[suspended] {who} reason={:?} delay_ms={:?}",
                    e.reason,
                    e.delay_ms
                );
            }
            EventKind::TaskResumed => log::info!("[resumed] {who}"),
            EventKind::TaskCancelRequested => {
                log::info!("[cancel-requested] {who} reason={:?}", e.reason);
            }
            EventKind::TaskCompleted => log::info!("[completed] {who}"),
            EventKind::TaskCancelled => log::info!("[cancelled] {who}"),
            EventKind::TaskFailed => {
                log::warn!("[failed] {who} reason={:?}", e.reason);
            }
            EventKind::ScopeClosing => log::info!("[scope-closing] reason={:?}", e.reason),
            EventKind::ScopeClosed => log::info!("[scope-closed]"),
            EventKind::FaultIsolated => {
                log::warn!("[fault-isolated] {who} reason={:?}", e.reason);
            }
            EventKind::InvariantViolated => {
                log::warn!("[invariant-violated] {who} reason={:?}", e.reason);
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                log::warn!("[subscriber] {who} reason={:?}", e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
