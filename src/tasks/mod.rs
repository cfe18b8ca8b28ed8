//! Task primitives: lifecycle state machine, shared cells, handles, and the
//! execution context passed to every body.

pub(crate) mod cell;
mod context;
mod handle;
mod state;

pub use context::TaskContext;
pub use handle::{ResultHandle, TaskHandle};
pub use state::{TaskId, TaskState};

pub(crate) use handle::ResultSlot;
