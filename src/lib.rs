//! Fan-out / fan-in task pipeline with batched reporting.
//!
//! A fixed pool of worker threads drains a work queue behind a start gate,
//! a single aggregator merges their results into shared state, and a
//! reporter thread summarizes that state whenever a batch fills up.

pub mod aggregator;
pub mod batch_signal;
pub mod clock;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod reporter;
pub mod shared_results;
pub mod start_gate;
pub mod types;
pub mod work_queue;
pub mod worker_pool;

pub use error::PipelineError;
pub use pipeline::{PipelineConfig, PipelineSummary, ReporterShutdown, run_pipeline};
