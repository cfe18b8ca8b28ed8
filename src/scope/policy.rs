//! # Scope policies and lifecycle.
//!
//! [`FailurePolicy`] decides what a scope does when a child fails;
//! [`StartMode`] decides when a spawned task first runs; [`ScopeState`]
//! tracks the scope's own lifecycle.

/// What a scope does when a child task settles in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first child fault cancels every sibling; the scope reports that
    /// single fault upward from `close()`.
    #[default]
    FailFast,
    /// A child fault is recorded and reported to the registered fault
    /// handler; siblings keep running and the scope itself does not fail.
    IsolateFailures,
}

impl FailurePolicy {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::IsolateFailures => "isolate_failures",
        }
    }
}

/// When a spawned task first runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Scheduled immediately at spawn.
    #[default]
    Eager,
    /// Stays `New` until `start()` (or until the scope's structural
    /// completion starts it).
    Lazy,
}

/// Lifecycle of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Accepting spawns.
    Open,
    /// Cancellation is propagating; new spawns are refused.
    Closing,
    /// Every child is terminal; the scope is done.
    Closed,
}
