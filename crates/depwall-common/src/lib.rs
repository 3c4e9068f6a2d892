//! depwall common - shared types for the dependency-graph packet filter
//!
//! This crate provides the primitives both halves of the system agree on:
//! - Value types (`MacAddr`, `IpProtocol`, `Verdict`)
//! - Lock-free counters
//! - Error handling for the control plane

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free monotonic counter
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_atomic_counter() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.inc(), 0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_atomic_counter_no_lost_updates() {
        let counter = Arc::new(AtomicCounter::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        counter.inc();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get(), 80_000);
    }
}
