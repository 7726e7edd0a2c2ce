//! Reporter thread that summarizes the shared collection on each wake.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::batch_signal::{BatchSignal, Wake};
use crate::error::PipelineError;
use crate::shared_results::SharedResults;

/// One published summary of the shared collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// 1-based report number within the run.
    pub sequence: u64,
    pub trigger: Wake,
    /// Entries in the collection when the report was taken.
    pub result_count: usize,
    /// Processed counter at the same moment (read without the lock).
    pub processed: u64,
}

/// Append-only record of the reports published so far.
///
/// Readable even when the reporter thread is abandoned instead of joined.
#[derive(Clone, Default)]
pub struct ReportLog {
    reports: Arc<Mutex<Vec<BatchReport>>>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, report: BatchReport) {
        self.reports
            .lock()
            .expect("report log mutex poisoned")
            .push(report);
    }

    pub fn snapshot(&self) -> Vec<BatchReport> {
        self.reports
            .lock()
            .expect("report log mutex poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().expect("report log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawn the reporter thread; it runs until the signal is shut down.
pub fn spawn_reporter(
    shared: Arc<SharedResults>,
    signal: Arc<BatchSignal>,
    log: ReportLog,
) -> Result<thread::JoinHandle<u64>, PipelineError> {
    thread::Builder::new()
        .name("reporter".to_string())
        .spawn(move || report_loop(&shared, &signal, &log))
        .map_err(|err| PipelineError::spawn("reporter", err))
}

/// Returns the number of reports published.
pub fn report_loop(shared: &SharedResults, signal: &BatchSignal, log: &ReportLog) -> u64 {
    tracing::info!("waiting for a full batch");
    let mut sequence = 0u64;
    loop {
        let trigger = match signal.wait() {
            Wake::Shutdown => break,
            wake => wake,
        };
        sequence += 1;
        let report = publish(shared, sequence, trigger);
        log.push(report);
    }
    tracing::info!(reports = sequence, "reporter stopped");
    sequence
}

fn publish(shared: &SharedResults, sequence: u64, trigger: Wake) -> BatchReport {
    let result_count = shared.with_entries(|entries| {
        tracing::info!(
            sequence,
            ?trigger,
            results = entries.len(),
            "woke up, reporting on collected results"
        );
        let mut ids: Vec<_> = entries.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            tracing::debug!(task_id = id, output = %entries[&id], "reported");
        }
        entries.len()
    });
    BatchReport {
        sequence,
        trigger,
        result_count,
        processed: shared.processed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_signal::SignalMode;
    use crate::types::TaskResult;

    #[test]
    fn reports_each_wake_until_shutdown() {
        let shared = SharedResults::new();
        let signal = BatchSignal::new(SignalMode::Counted);
        let log = ReportLog::new();

        for id in 1..=3 {
            shared.record(TaskResult::new(id, "out"));
            shared.mark_processed();
        }
        signal.notify_batch();
        signal.request_flush();
        signal.shutdown();

        let published = report_loop(&shared, &signal, &log);

        assert_eq!(published, 2);
        let reports = log.snapshot();
        assert_eq!(reports[0].trigger, Wake::Batch);
        assert_eq!(reports[1].trigger, Wake::Flush);
        assert_eq!(reports[1].sequence, 2);
        assert!(reports.iter().all(|r| r.result_count == 3 && r.processed == 3));
    }

    #[test]
    fn spawned_reporter_sees_latest_state() {
        let shared = Arc::new(SharedResults::new());
        let signal = Arc::new(BatchSignal::new(SignalMode::Counted));
        let log = ReportLog::new();
        let handle = spawn_reporter(Arc::clone(&shared), Arc::clone(&signal), log.clone())
            .expect("spawn reporter");

        shared.record(TaskResult::new(1, "out"));
        shared.mark_processed();
        signal.request_flush();
        signal.shutdown();

        assert_eq!(handle.join().expect("reporter panicked"), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].result_count, 1);
    }

    #[test]
    fn shutdown_without_work_publishes_nothing() {
        let shared = SharedResults::new();
        let signal = BatchSignal::new(SignalMode::Lossy);
        let log = ReportLog::new();
        signal.shutdown();
        assert_eq!(report_loop(&shared, &signal, &log), 0);
        assert!(log.is_empty());
    }
}
