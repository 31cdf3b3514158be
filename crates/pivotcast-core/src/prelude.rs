//! Convenient re-exports for downstream crates.

pub use crate::config::{Transport, WorkerConfig};
pub use crate::error::{Error, ResourceKind, Result};
pub use crate::flat::{CellDelta, ColSpan, FlatResult, RowSpan, UNIT_SEPARATOR};
pub use crate::id::{ContextId, GnodeId, TableName, ViewName};
pub use crate::mapper::{AggregateOp, Dtype, FilterOp, SortOrder};
pub use crate::schema::{LogicalType, Schema};
pub use crate::types::{Row, Scalar};
pub use crate::view_config::{AggregateConfig, ColumnRef, Sidedness, ViewConfig};
