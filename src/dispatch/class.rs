//! # Execution-context classes.
//!
//! An execution context is a named pool of workers specialized for a workload
//! class. A task is bound to exactly one class at creation and the binding is
//! immutable: a task bound to class X is only ever executed by a worker of
//! pool X.

use std::fmt;

/// Workload class a task is bound to at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextClass {
    /// Compute-oriented pool: small, bounded worker count.
    Compute,
    /// I/O-oriented pool: large worker count for tasks that mostly wait.
    Io,
    /// Inherit the current context: after a suspension the task resumes on
    /// whatever worker happens to be free. No placement guarantee beyond
    /// "some live worker", and no pool permit is held.
    Inherit,
}

impl ContextClass {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            ContextClass::Compute => "compute",
            ContextClass::Io => "io",
            ContextClass::Inherit => "inherit",
        }
    }
}

impl fmt::Display for ContextClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
