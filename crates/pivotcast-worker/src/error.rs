use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("engine failed to boot: {0}")]
    Boot(String),

    #[error("worker channel closed")]
    Closed,

    #[error("malformed command: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("could not start worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] pivotcast_core::error::Error),
}
