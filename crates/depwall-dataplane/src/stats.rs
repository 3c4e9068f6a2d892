//! Statistics registry
//!
//! Four process-wide counters, each on its own cache line so contexts
//! updating different counters do not false-share.

use crossbeam::utils::CachePadded;
use depwall_common::AtomicCounter;
use serde::Serialize;
use std::fmt;

/// Counter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Every frame handed to the engine
    Total,
    /// Frames admitted by the dependency check
    Allowed,
    /// Frames denied by the dependency check
    Dropped,
    /// Malformed frames
    Invalid,
}

impl Counter {
    /// All counters, in report order
    pub const ALL: [Counter; 4] = [
        Counter::Total,
        Counter::Allowed,
        Counter::Dropped,
        Counter::Invalid,
    ];

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Counter::Total => "total",
            Counter::Allowed => "allowed",
            Counter::Dropped => "dropped",
            Counter::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared counter set
#[derive(Debug, Default)]
pub struct Statistics {
    total: CachePadded<AtomicCounter>,
    allowed: CachePadded<AtomicCounter>,
    dropped: CachePadded<AtomicCounter>,
    invalid: CachePadded<AtomicCounter>,
}

impl Statistics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn counter(&self, counter: Counter) -> &AtomicCounter {
        match counter {
            Counter::Total => &*self.total,
            Counter::Allowed => &*self.allowed,
            Counter::Dropped => &*self.dropped,
            Counter::Invalid => &*self.invalid,
        }
    }

    /// Add one to `counter`
    #[inline(always)]
    pub fn increment(&self, counter: Counter) {
        self.counter(counter).inc();
    }

    /// Current value of one counter
    #[inline]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).get()
    }

    /// Read all four; each value is monotonic, the set is not read atomically
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.get(),
            allowed: self.allowed.get(),
            dropped: self.dropped.get(),
            invalid: self.invalid.get(),
        }
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Every frame seen
    pub total: u64,
    /// Admitted by policy
    pub allowed: u64,
    /// Denied by policy
    pub dropped: u64,
    /// Malformed
    pub invalid: u64,
}

impl CounterSnapshot {
    /// Value by name
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Total => self.total,
            Counter::Allowed => self.allowed,
            Counter::Dropped => self.dropped,
            Counter::Invalid => self.invalid,
        }
    }

    /// Share of policy decisions that were denials
    pub fn drop_rate(&self) -> f64 {
        let decided = self.allowed + self.dropped;
        if decided == 0 {
            return 0.0;
        }
        self.dropped as f64 / decided as f64
    }

    /// Counter growth since `earlier`
    pub fn delta(&self, earlier: &CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.saturating_sub(earlier.total),
            allowed: self.allowed.saturating_sub(earlier.allowed),
            dropped: self.dropped.saturating_sub(earlier.dropped),
            invalid: self.invalid.saturating_sub(earlier.invalid),
        }
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} allowed={} dropped={} invalid={}",
            self.total, self.allowed, self.dropped, self.invalid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_and_snapshot() {
        let stats = Statistics::new();
        stats.increment(Counter::Total);
        stats.increment(Counter::Total);
        stats.increment(Counter::Dropped);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.allowed, 0);
        assert_eq!(snap.get(Counter::Invalid), 0);
        assert_eq!(stats.get(Counter::Total), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(Statistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        stats.increment(Counter::Total);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().total, 40_000);
    }

    #[test]
    fn test_drop_rate() {
        assert_eq!(CounterSnapshot::default().drop_rate(), 0.0);
        let snap = CounterSnapshot {
            total: 10,
            allowed: 3,
            dropped: 1,
            invalid: 6,
        };
        assert!((snap.drop_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delta_and_display() {
        let a = CounterSnapshot { total: 5, allowed: 2, dropped: 1, invalid: 2 };
        let b = CounterSnapshot { total: 9, allowed: 4, dropped: 2, invalid: 3 };
        assert_eq!(
            b.delta(&a),
            CounterSnapshot { total: 4, allowed: 2, dropped: 1, invalid: 1 }
        );
        assert_eq!(b.to_string(), "total=9 allowed=4 dropped=2 invalid=3");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = CounterSnapshot { total: 1, allowed: 1, dropped: 0, invalid: 0 };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["invalid"], 0);
    }
}
