//! Batch-ready notification between the aggregator and the reporter.

use std::sync::{Condvar, Mutex};

/// How batch-ready signals behave when the reporter is not parked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignalMode {
    /// Signals accumulate in a pending counter and are never lost.
    #[default]
    Counted,
    /// A signal only lands if the reporter is currently waiting; otherwise it
    /// is dropped and counted as missed.
    Lossy,
}

/// Why a call to [`BatchSignal::wait`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Batch,
    Flush,
    Shutdown,
}

/// Delivery counters, readable at any time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub sent: u64,
    pub delivered: u64,
    pub missed: u64,
}

struct SignalState {
    parked: bool,
    pending: u64,
    flush_requested: bool,
    shutdown: bool,
    stats: SignalStats,
}

/// Condition-style channel with one waiter (the reporter).
///
/// Batch signals wake at most one waiter. Flush and shutdown are broadcasts
/// and stay latched until the waiter observes them.
pub struct BatchSignal {
    mode: SignalMode,
    state: Mutex<SignalState>,
    ready: Condvar,
}

impl BatchSignal {
    pub fn new(mode: SignalMode) -> Self {
        Self {
            mode,
            state: Mutex::new(SignalState {
                parked: false,
                pending: 0,
                flush_requested: false,
                shutdown: false,
                stats: SignalStats::default(),
            }),
            ready: Condvar::new(),
        }
    }

    pub fn mode(&self) -> SignalMode {
        self.mode
    }

    /// Raise batch-ready; returns whether the signal was kept.
    pub fn notify_batch(&self) -> bool {
        let mut guard = self.state.lock().expect("batch signal mutex poisoned");
        guard.stats.sent += 1;
        let kept = match self.mode {
            SignalMode::Counted => true,
            // The parked flag is consumed so a second signal before the
            // reporter runs again is lost, like a plain condvar signal.
            SignalMode::Lossy => std::mem::replace(&mut guard.parked, false),
        };
        if kept {
            guard.pending += 1;
            self.ready.notify_one();
        } else {
            guard.stats.missed += 1;
        }
        kept
    }

    /// Force a wake of every waiter for a final report.
    pub fn request_flush(&self) {
        let mut guard = self.state.lock().expect("batch signal mutex poisoned");
        guard.flush_requested = true;
        self.ready.notify_all();
    }

    /// Ask the waiter to exit once pending batches and flushes are handled.
    pub fn shutdown(&self) {
        let mut guard = self.state.lock().expect("batch signal mutex poisoned");
        guard.shutdown = true;
        self.ready.notify_all();
    }

    /// Park until a batch, flush, or shutdown is pending.
    ///
    /// The condvar wait releases the lock while parked and reacquires it
    /// before the pending state is inspected.
    pub fn wait(&self) -> Wake {
        let mut guard = self.state.lock().expect("batch signal mutex poisoned");
        loop {
            if guard.pending > 0 {
                guard.pending -= 1;
                guard.parked = false;
                guard.stats.delivered += 1;
                return Wake::Batch;
            }
            if guard.flush_requested {
                guard.flush_requested = false;
                guard.parked = false;
                return Wake::Flush;
            }
            if guard.shutdown {
                guard.parked = false;
                return Wake::Shutdown;
            }
            guard.parked = true;
            guard = self.ready.wait(guard).expect("condvar wait failed");
        }
    }

    pub fn stats(&self) -> SignalStats {
        self.state
            .lock()
            .expect("batch signal mutex poisoned")
            .stats
    }

    pub fn is_parked(&self) -> bool {
        self.state.lock().expect("batch signal mutex poisoned").parked
    }
}
