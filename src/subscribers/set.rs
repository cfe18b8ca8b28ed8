//! # SubscriberSet: bounded fan-out of bus events.
//!
//! One queue and one worker per subscriber; [`SubscriberSet::emit`] never
//! waits on any of them.
//!
//! ```text
//! emit(&Event) ──┬──► [queue A] ─► worker A ─► a.on_event()
//!                ├──► [queue B] ─► worker B ─► b.on_event()
//!                └──► [queue C] ─► worker C ─► c.on_event()
//! ```
//!
//! ## Rules
//! - Ordering holds per subscriber only; A may be several events ahead of B.
//! - A full or closed queue drops the event for that subscriber and publishes
//!   `SubscriberOverflow` back on the bus. Overflow events that themselves
//!   fail to enqueue are not re-reported, so a saturated set cannot feed
//!   itself.
//! - A panic inside `on_event` is caught, published as `SubscriberPanicked`,
//!   and the worker continues with the next event. Other subscribers never
//!   notice.
//!
//! `AssertUnwindSafe` is used for the catch; a subscriber that panics while
//! holding shared state can leave that state inconsistent.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};

use super::Subscribe;

/// Per-subscriber channel with metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Each subscriber gets a bounded queue (capacity from
    /// [`Subscribe::queue_capacity`], clamped to >= 1) and a dedicated worker
    /// task. Drops and panics are reported on `bus`. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        log::warn!("subscriber '{}' panicked: {info}", s.name());
                        // a panic on the panic report itself is not
                        // re-reported (loop guard)
                        if !matches!(ev.kind, EventKind::SubscriberPanicked) {
                            worker_bus.publish(Event::subscriber_panicked(s.name(), info));
                        }
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Fan-out one event to all subscribers (non-blocking).
    ///
    /// If a subscriber's queue is full or its worker is gone, the event is
    /// dropped for it and a `SubscriberOverflow` is published — unless the
    /// dropped event is itself an overflow report (loop guard).
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        let is_overflow = matches!(ev.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("subscriber '{}' dropped event: queue full", channel.name);
                    if !is_overflow {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "queue full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::warn!("subscriber '{}' dropped event: worker closed", channel.name);
                    if !is_overflow {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "worker closed"));
                    }
                }
            }
        }
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    struct Bomb;

    #[async_trait]
    impl Subscribe for Bomb {
        async fn on_event(&self, _event: &Event) {
            panic!("subscriber on fire");
        }

        fn name(&self) -> &'static str {
            "bomb"
        }
    }

    struct Stuck;

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _event: &Event) {
            std::future::pending::<()>().await;
        }

        fn name(&self) -> &'static str {
            "stuck"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = Bus::new(16);
        let a = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let b = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let set = SubscriberSet::new(vec![a.clone(), b.clone()], bus);

        for _ in 0..3 {
            set.emit(&Event::new(EventKind::TaskStarted));
        }
        set.shutdown().await;

        assert_eq!(a.seen.load(Ordering::SeqCst), 3);
        assert_eq!(b.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_subscriber_panic_is_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Bomb)], bus);

        set.emit(&Event::new(EventKind::TaskStarted));
        set.shutdown().await;

        let ev = rx.recv().await.expect("panic report");
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.task.as_deref(), Some("bomb"));
        assert!(ev.reason.as_deref().unwrap_or("").contains("on fire"));
    }

    #[tokio::test]
    async fn test_queue_overflow_is_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stuck)], bus);

        // capacity 1 and a worker that never finishes: the third emit cannot
        // possibly fit
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::TaskStarted));
        }

        let ev = rx.recv().await.expect("overflow report");
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.task.as_deref(), Some("stuck"));
    }
}
