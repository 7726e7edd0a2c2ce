//! One-time broadcast release gate for the worker pool.

use std::sync::{Condvar, Mutex};

struct GateState {
    released: bool,
    arrived: usize,
}

/// Holds every waiter until a single `release` fires.
///
/// Waiters arriving after the release pass straight through. The gate also
/// counts arrivals so the releasing thread can confirm every worker is parked.
pub struct StartGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                released: false,
                arrived: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Register arrival and block until the gate is released.
    pub fn wait(&self) {
        let mut guard = self.state.lock().expect("start gate mutex poisoned");
        guard.arrived += 1;
        // Arrival counters are waiting on the same condvar.
        self.changed.notify_all();
        while !guard.released {
            guard = self.changed.wait(guard).expect("condvar wait failed");
        }
    }

    /// Block until at least `count` threads have called `wait`.
    pub fn await_arrivals(&self, count: usize) {
        let mut guard = self.state.lock().expect("start gate mutex poisoned");
        while guard.arrived < count {
            guard = self.changed.wait(guard).expect("condvar wait failed");
        }
    }

    /// Open the gate for everyone; returns `false` if it was already open.
    pub fn release(&self) -> bool {
        let mut guard = self.state.lock().expect("start gate mutex poisoned");
        if guard.released {
            return false;
        }
        guard.released = true;
        self.changed.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().expect("start gate mutex poisoned").released
    }

    pub fn arrived(&self) -> usize {
        self.state.lock().expect("start gate mutex poisoned").arrived
    }
}
