//! Fixed-size pool of worker threads draining the work queue.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::clock::{EarliestTick, LogicalClock};
use crate::error::PipelineError;
use crate::start_gate::StartGate;
use crate::types::{Task, TaskResult, WorkerId};
use crate::work_queue::WorkQueue;

/// Inclusive bounds for the simulated per-task work latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkLatency {
    pub min: Duration,
    pub max: Duration,
}

impl WorkLatency {
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(duration: Duration) -> Self {
        Self::between(duration, duration)
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Draw one latency from the range.
    pub fn sample(&self) -> Duration {
        let min = self.min.as_micros() as u64;
        let max = self.max.as_micros() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_micros(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for WorkLatency {
    fn default() -> Self {
        Self::between(Duration::from_millis(50), Duration::from_millis(150))
    }
}

/// Transformation applied by every worker; never fails.
pub fn transform(task: &Task) -> TaskResult {
    TaskResult::new(task.id, format!("Processed {}", task.payload))
}

/// Everything a worker thread needs, cloned once per worker.
#[derive(Clone)]
struct WorkerContext {
    gate: Arc<StartGate>,
    tasks: Arc<WorkQueue<Task>>,
    results: Arc<WorkQueue<TaskResult>>,
    latency: WorkLatency,
    clock: Arc<LogicalClock>,
    first_transform: Arc<EarliestTick>,
}

/// Handle to the running workers.
pub struct WorkerPool {
    handles: Vec<(WorkerId, thread::JoinHandle<usize>)>,
}

impl WorkerPool {
    /// Spawn `size` workers; each parks at `gate` before touching `tasks`.
    pub fn spawn(
        size: usize,
        gate: Arc<StartGate>,
        tasks: Arc<WorkQueue<Task>>,
        results: Arc<WorkQueue<TaskResult>>,
        latency: WorkLatency,
        clock: Arc<LogicalClock>,
        first_transform: Arc<EarliestTick>,
    ) -> Result<Self, PipelineError> {
        let context = WorkerContext {
            gate,
            tasks,
            results,
            latency,
            clock,
            first_transform,
        };

        let mut handles = Vec::with_capacity(size);
        for worker_id in 1..=size {
            let context = context.clone();
            let name = format!("worker-{worker_id}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(worker_id, context))
                .map_err(|err| PipelineError::spawn(name, err))?;
            handles.push((worker_id, handle));
        }
        Ok(Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker; returns tasks processed per worker, by id order.
    pub fn join(self) -> Result<Vec<usize>, PipelineError> {
        let mut per_worker = Vec::with_capacity(self.handles.len());
        for (worker_id, handle) in self.handles {
            let processed = handle
                .join()
                .map_err(|_| PipelineError::panicked(format!("worker-{worker_id}")))?;
            per_worker.push(processed);
        }
        Ok(per_worker)
    }
}

fn worker_loop(worker_id: WorkerId, context: WorkerContext) -> usize {
    tracing::debug!(worker_id, "ready, waiting for start signal");
    context.gate.wait();
    tracing::debug!(worker_id, "starting work");

    let mut processed = 0usize;
    while let Some(task) = context.tasks.pop_blocking_or_closed() {
        context.first_transform.observe(context.clock.tick());
        tracing::debug!(worker_id, task_id = task.id, "processing task");

        let latency = context.latency.sample();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let result = transform(&task);
        if let Err(rejected) = context.results.push(result) {
            // Only reachable if the result queue is closed while workers run.
            tracing::error!(
                worker_id,
                task_id = rejected.task_id,
                "result queue closed, dropping result"
            );
            break;
        }
        processed += 1;
    }

    tracing::debug!(worker_id, processed, "finished, no more tasks");
    processed
}
