//! Reconciliation primitives for the managed Kubernetes driver.
//!
//! This library holds the provider-agnostic parts of driving a remote
//! cluster to a desired state:
//!
//! - **Execution context**: cancellation and deadlines for every remote call
//!   ([`OpContext`]).
//! - **Polling**: waiting on an eventually-consistent status field until it
//!   settles ([`wait_for`]).
//! - **Retry**: a small fixed-delay budget for calls that are known to fail
//!   transiently ([`retry_fixed`]).
//! - **Scale bounds**: keeping autoscaler ranges consistent with manual
//!   resizes ([`ScaleBounds`]).
//!
//! # Invariants
//!
//! - Nothing here keeps state between calls; every wait starts from a fresh
//!   remote read.
//! - Polling has no attempt ceiling. The context is the only escape hatch.

pub mod context;
pub mod poll;

use std::time::Duration;

pub use context::{Interrupted, OpContext};
pub use poll::{retry_fixed, retry_fixed_when, wait_for, FixedRetry, Probe, WaitError};

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Autoscaler bounds of a node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleBounds {
    pub min: u32,
    pub max: u32,
}

impl ScaleBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Returns true if `count` lies within the bounds.
    pub fn contains(&self, count: u32) -> bool {
        self.min <= count && count <= self.max
    }

    /// Widen the violated side of the range so that it admits `count`.
    ///
    /// Only the side being violated moves; the other bound is left as is,
    /// even if that leaves the range wider than before.
    pub fn widen_to(self, count: u32) -> Self {
        if count < self.min {
            Self { min: count, ..self }
        } else if count > self.max {
            Self { max: count, ..self }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_raises_max_only() {
        let bounds = ScaleBounds::new(2, 6).widen_to(8);
        assert_eq!(bounds, ScaleBounds::new(2, 8));
    }

    #[test]
    fn test_widen_lowers_min_only() {
        let bounds = ScaleBounds::new(2, 6).widen_to(1);
        assert_eq!(bounds, ScaleBounds::new(1, 6));
    }

    #[test]
    fn test_widen_inside_range_is_noop() {
        let bounds = ScaleBounds::new(2, 6);
        assert_eq!(bounds.widen_to(2), bounds);
        assert_eq!(bounds.widen_to(6), bounds);
        assert_eq!(bounds.widen_to(4), bounds);
        assert!(bounds.contains(4));
        assert!(!bounds.contains(7));
    }
}
