//! Subscriber fan-out: the extension seam for observing state transitions.

mod set;
mod subscribe;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use self::log::LogWriter;
