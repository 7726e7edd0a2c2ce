//! Single consumer of the result queue that feeds the shared collection.

use std::sync::Arc;
use std::thread;

use crate::batch_signal::BatchSignal;
use crate::error::PipelineError;
use crate::shared_results::SharedResults;
use crate::types::TaskResult;
use crate::work_queue::WorkQueue;

/// Totals observed by the aggregator over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub aggregated: u64,
    pub batch_signals: u64,
    pub duplicates: u64,
}

/// Spawn the aggregator thread.
pub fn spawn_aggregator(
    results: Arc<WorkQueue<TaskResult>>,
    shared: Arc<SharedResults>,
    signal: Arc<BatchSignal>,
    batch_size: usize,
) -> Result<thread::JoinHandle<AggregatorStats>, PipelineError> {
    thread::Builder::new()
        .name("aggregator".to_string())
        .spawn(move || aggregate(&results, &shared, &signal, batch_size))
        .map_err(|err| PipelineError::spawn("aggregator", err))
}

/// Drain `results` until closed, signaling every `batch_size` merged results.
pub fn aggregate(
    results: &WorkQueue<TaskResult>,
    shared: &SharedResults,
    signal: &BatchSignal,
    batch_size: usize,
) -> AggregatorStats {
    debug_assert!(batch_size > 0, "batch_size must be > 0");
    let mut stats = AggregatorStats::default();
    // Results merged since the last batch-ready signal.
    let mut batch_count = 0usize;

    while let Some(result) = results.pop_blocking_or_closed() {
        let task_id = result.task_id;
        if shared.record(result).is_some() {
            stats.duplicates += 1;
            tracing::warn!(task_id, "task id aggregated twice");
        }
        shared.mark_processed();
        stats.aggregated += 1;

        batch_count += 1;
        if batch_count >= batch_size {
            let kept = signal.notify_batch();
            stats.batch_signals += 1;
            if kept {
                tracing::info!(batch_size, "batch is full, signaling reporter");
            } else {
                tracing::warn!(batch_size, "batch is full but reporter was busy, signal missed");
            }
            batch_count = 0;
        }
    }

    tracing::info!(aggregated = stats.aggregated, "result queue closed, shutting down");
    stats
}
