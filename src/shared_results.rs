//! Result collection shared by the aggregator (writer) and reporter (reader).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{TaskId, TaskResult};

/// Task outputs keyed by task id, plus an independent processed counter.
///
/// The map is guarded by one mutex; the counter is only touched atomically
/// and never takes the lock.
pub struct SharedResults {
    entries: Mutex<HashMap<TaskId, String>>,
    processed: AtomicU64,
}

impl SharedResults {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            processed: AtomicU64::new(0),
        }
    }

    /// Store a result; returns the previous output if the id was already present.
    pub fn record(&self, result: TaskResult) -> Option<String> {
        let mut guard = self.entries.lock().expect("results mutex poisoned");
        guard.insert(result.task_id, result.output)
    }

    /// Bump the processed counter and return the new total.
    pub fn mark_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("results mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `read` against the collection while holding the lock.
    pub fn with_entries<R>(&self, read: impl FnOnce(&HashMap<TaskId, String>) -> R) -> R {
        let guard = self.entries.lock().expect("results mutex poisoned");
        read(&guard)
    }

    /// Copy of the collection ordered by task id.
    pub fn snapshot(&self) -> BTreeMap<TaskId, String> {
        self.with_entries(|entries| {
            entries
                .iter()
                .map(|(&id, output)| (id, output.clone()))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn record_reports_overwrites() {
        let shared = SharedResults::new();
        assert_eq!(shared.record(TaskResult::new(1, "a")), None);
        assert_eq!(
            shared.record(TaskResult::new(1, "b")),
            Some("a".to_string())
        );
        assert_eq!(shared.len(), 1);
        assert_eq!(shared.snapshot().get(&1).map(String::as_str), Some("b"));
    }

    #[test]
    fn counter_is_independent_of_the_map() {
        let shared = SharedResults::new();
        assert_eq!(shared.mark_processed(), 1);
        assert_eq!(shared.mark_processed(), 2);
        assert_eq!(shared.processed(), 2);
        assert!(shared.is_empty());
    }

    #[test]
    fn concurrent_counter_updates_are_not_lost() {
        let shared = Arc::new(SharedResults::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let shared = Arc::clone(&shared);
            handles.push(thread::spawn(move || {
                for _ in 0..250 {
                    shared.mark_processed();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("counter thread panicked");
        }
        assert_eq!(shared.processed(), 2000);
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let shared = SharedResults::new();
        for id in [5, 1, 3] {
            shared.record(TaskResult::new(id, format!("out-{id}")));
        }
        let ids: Vec<TaskId> = shared.snapshot().into_keys().collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
