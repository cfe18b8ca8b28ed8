//! # Event bus: the one channel every lifecycle event travels on.
//!
//! Task drivers, scopes, and the dispatcher all publish into the same
//! [`Bus`]; the scheduler's subscriber listener reads from it. The bus is a
//! ring buffer: publishing never waits for readers, and a reader that falls
//! too far behind skips ahead rather than applying backpressure to the
//! scheduler.
//!
//! ```text
//! driver / scope / dispatcher ──► Bus ──► listener ──► SubscriberSet
//!                            (ring of `capacity` events)
//! ```
//!
//! Events are delivery-best-effort only: nothing is stored for receivers
//! that subscribe later, and a slow receiver sees `RecvError::Lagged(n)` in
//! place of the `n` events it missed.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for scheduler events.
///
/// Cheap to clone; every clone publishes into the same ring. Scheduling
/// correctness never depends on anyone reading the bus.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring holds `capacity` events (clamped to >= 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event; never waits, even with no receivers attached.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Attaches an independent receiver.
    ///
    /// The receiver observes only events published after this call; falling
    /// behind by more than the ring capacity surfaces as
    /// `RecvError::Lagged(n)`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TaskSpawned).with_task("t"));
        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::TaskSpawned);
        assert_eq!(ev.task.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = Bus::new(8);
        // must not block or panic
        bus.publish(Event::new(EventKind::ScopeClosed));
    }
}
