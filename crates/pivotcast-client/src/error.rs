use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The worker shut down before answering.
    #[error("worker is shut down")]
    Closed,

    #[error(transparent)]
    Core(#[from] pivotcast_core::error::Error),

    #[error(transparent)]
    Worker(#[from] pivotcast_worker::WorkerError),
}
