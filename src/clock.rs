//! Logical clock used to order pipeline events without wall-clock timing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter shared by the orchestrator and the workers.
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Advance the clock and return the new tick (first tick is 1).
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Smallest tick reported by any thread; unset until the first observation.
pub struct EarliestTick {
    tick: AtomicU64,
}

impl EarliestTick {
    pub fn new() -> Self {
        Self {
            tick: AtomicU64::new(u64::MAX),
        }
    }

    pub fn observe(&self, tick: u64) {
        self.tick.fetch_min(tick, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<u64> {
        match self.tick.load(Ordering::SeqCst) {
            u64::MAX => None,
            tick => Some(tick),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ticks_are_unique_across_threads() {
        let clock = Arc::new(LogicalClock::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let clock = Arc::clone(&clock);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| clock.tick()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("ticking thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(clock.now(), 400);
    }

    #[test]
    fn earliest_tick_keeps_minimum() {
        let earliest = EarliestTick::new();
        assert_eq!(earliest.get(), None);
        earliest.observe(9);
        earliest.observe(4);
        earliest.observe(7);
        assert_eq!(earliest.get(), Some(4));
    }
}
