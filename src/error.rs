use std::io;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: String,
        #[source]
        source: io::Error,
    },

    #[error("{role} thread panicked")]
    ThreadPanicked { role: String },

    #[error("{queue} queue closed before task {task_id} was published")]
    QueueClosed { queue: &'static str, task_id: TaskId },
}

impl PipelineError {
    pub(crate) fn spawn(role: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            role: role.into(),
            source,
        }
    }

    pub(crate) fn panicked(role: impl Into<String>) -> Self {
        Self::ThreadPanicked { role: role.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_role() {
        let err = PipelineError::panicked("worker-3");
        assert_eq!(err.to_string(), "worker-3 thread panicked");

        let err = PipelineError::spawn("reporter", io::Error::other("no threads left"));
        assert!(err.to_string().contains("reporter"));
        assert!(err.to_string().contains("no threads left"));
    }
}
