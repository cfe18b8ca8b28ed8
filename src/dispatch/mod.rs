//! Dispatch layer: execution contexts, worker pools, and the task driver.

mod class;
mod dispatcher;
mod driver;
mod pool;

pub use class::ContextClass;

pub(crate) use dispatcher::Dispatcher;
pub(crate) use driver::make_launch;
