//! # The subscriber trait.
//!
//! Implement [`Subscribe`] to observe scheduler events — logging, metrics,
//! test probes. The [`SubscriberSet`](crate::subscribers::SubscriberSet)
//! gives each subscriber its own bounded queue and worker, so one slow sink
//! costs only its own events: when its queue fills, its events are dropped
//! and the drop is reported; the scheduler and the other subscribers keep
//! their pace.

use async_trait::async_trait;

use crate::events::Event;

/// An event sink fed by a dedicated worker task.
///
/// `on_event` may take its time (I/O, batching), but it should stay
/// cooperative: it runs on the shared async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used when reporting drops and panics for this subscriber.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
