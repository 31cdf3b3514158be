use arrow::error::ArrowError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("arrow decode error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("empty buffer")]
    Empty,
}

impl From<IngestError> for pivotcast_core::error::Error {
    fn from(e: IngestError) -> Self {
        pivotcast_core::error::Error::Decode(e.to_string())
    }
}
