//! Structured-concurrency scopes: child ownership, failure policies, and
//! collective cancellation.

mod policy;
#[allow(clippy::module_inception)]
mod scope;

pub use policy::{FailurePolicy, ScopeState, StartMode};
pub use scope::Scope;

pub(crate) use scope::ScopeShared;
