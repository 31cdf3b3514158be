#![forbid(unsafe_code)]
//! pivotcast-view: from a `ViewConfig` to an engine context, and from a live
//! context back to a `FlatResult`.
//!
//! - `builder`: validates a view configuration against a table schema and
//!   lowers it to a `ContextDescriptor` (zero/one/two-sided)
//! - `flatten`: reads a context's leaf data into a row-major snapshot
//! - `spans`: run-length header compression and row span child counts

pub mod builder;
pub mod flatten;
pub mod spans;

pub use builder::{build_context, context_descriptor, BuiltContext};
pub use flatten::flat_snapshot;
pub use spans::{annotate_child_counts, ColSpanBuilder, RowSpanBuilder};
