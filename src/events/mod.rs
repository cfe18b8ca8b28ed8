//! Lifecycle events and the broadcast bus they travel on.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
