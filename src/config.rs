//! # Global scheduler configuration.
//!
//! [`SchedulerConfig`] sizes the execution-context worker pools and the
//! event bus.
//!
//! # Example
//! ```
//! use taskscope::SchedulerConfig;
//!
//! let mut cfg = SchedulerConfig::default();
//! cfg.compute_workers = 2;
//!
//! assert_eq!(cfg.compute_workers, 2);
//! ```

/// Configuration for the scheduler and its worker pools.
///
/// A task bound to an execution context is only ever run by a worker of that
/// context's pool; the sizes below are the per-pool worker counts.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Worker count of the compute-oriented pool (bounded, CPU-style).
    pub compute_workers: usize,
    /// Worker count of the I/O-oriented pool (large, elastic-style).
    pub io_workers: usize,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl Default for SchedulerConfig {
    /// Provides a default configuration:
    /// - `compute_workers = 4`
    /// - `io_workers = 64`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            compute_workers: 4,
            io_workers: 64,
            bus_capacity: 1024,
        }
    }
}
