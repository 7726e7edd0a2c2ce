//! Bounded, closable FIFO shared between producer and consumer threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A synchronized FIFO with a fixed capacity and a one-way close.
///
/// Producers block while the queue is full; consumers block while it is
/// empty and still open. Once closed, pushes are rejected and consumers
/// drain whatever is left before seeing `None`.
pub struct WorkQueue<T> {
    inner: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> WorkQueue<T> {
    /// Create an empty queue holding at most `capacity` items (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Push an item, waiting for room; returns the item back if the queue is closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut guard = self.inner.lock().expect("work queue mutex poisoned");
        loop {
            if guard.closed {
                return Err(item);
            }
            if guard.items.len() < self.capacity {
                break;
            }
            guard = self.not_full.wait(guard).expect("condvar wait failed");
        }
        guard.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Try to pop immediately without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("work queue mutex poisoned");
        let item = guard.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Block until an item is available or the queue is closed and drained.
    pub fn pop_blocking_or_closed(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("work queue mutex poisoned");
        loop {
            if let Some(item) = guard.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if guard.closed {
                return None;
            }
            // Wait releases the lock and re-acquires it before returning.
            guard = self.not_empty.wait(guard).expect("condvar wait failed");
        }
    }

    /// Close the queue and wake every blocked producer and consumer.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("work queue mutex poisoned");
        guard.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("work queue mutex poisoned").closed
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("work queue mutex poisoned");
        guard.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
