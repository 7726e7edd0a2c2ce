//! Shared identifiers and records passed between pipeline stages.

/// Unique identifier for a task; results carry the originating task's id.
pub type TaskId = u64;
/// Identifier for a worker thread (1-based, matches the thread name).
pub type WorkerId = usize;

/// Unit of work published by the task source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Stable task identifier, unique within one pipeline run.
    pub id: TaskId,
    /// Opaque input handed to the transformation.
    pub payload: String,
}

impl Task {
    /// Construct a new task with the provided id and payload.
    pub fn new(id: TaskId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Output of transforming exactly one task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub output: String,
}

impl TaskResult {
    pub fn new(task_id: TaskId, output: impl Into<String>) -> Self {
        Self {
            task_id,
            output: output.into(),
        }
    }
}
