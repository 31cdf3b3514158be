#![forbid(unsafe_code)]
//! pivotcast-ingest: decode Arrow IPC buffers into positional column arrays.
//!
//! Both IPC framings are accepted: the file format (leading `ARROW1` magic) and
//! the stream format. Columns whose Arrow type has no storage dtype are left out
//! of the result instead of failing the whole buffer.

pub mod arrow_loader;
pub mod error;

pub use arrow_loader::{load_arrow_buffer, storage_type_for, IngestedBuffer};
pub use error::{IngestError, Result};
