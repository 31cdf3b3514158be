//! The Engine Core capability: the operations the protocol layer needs from a
//! columnar aggregation engine, keyed by opaque ids.
//!
//! Nothing above this trait knows how tables are stored or how aggregates are
//! computed. Every read returns owned values, so there is nothing to release
//! beyond dropping them.

use serde::{Deserialize, Serialize};

use pivotcast_core::error::Result;
use pivotcast_core::flat::CellDelta;
use pivotcast_core::id::{ContextId, GnodeId};
use pivotcast_core::mapper::{logical_type_of, AggregateOp, Dtype, FilterOp};
use pivotcast_core::schema::{LogicalType, Schema};
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::Sidedness;

/// Header axis of a pivoted context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Header {
    Row,
    Column,
}

/// Declared shape of a new table. `index` names the primary-key column; tables
/// without one append on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub names: Vec<String>,
    pub types: Vec<Dtype>,
    pub index: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub names: Vec<String>,
    pub types: Vec<Dtype>,
}

impl TableSchema {
    pub fn dtype_of(&self, name: &str) -> Option<Dtype> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.types.get(i).copied())
    }

    /// Logical view of the storage schema; exotic dtypes read as strings.
    pub fn logical(&self) -> Schema {
        self.names
            .iter()
            .zip(&self.types)
            .map(|(n, t)| (n.clone(), logical_type_of(*t).unwrap_or(LogicalType::String)))
            .collect()
    }
}

/// Positional column arrays for one ingest call.
///
/// `offset` is the first row position the batch is written at; it is ignored by
/// tables with a primary index, which upsert by key instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    pub record_count: usize,
    pub names: Vec<String>,
    pub types: Vec<Dtype>,
    pub columns: Vec<Vec<Scalar>>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub name: String,
    pub op: AggregateOp,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOperand {
    None,
    Scalar(Scalar),
    List(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub op: FilterOp,
    pub operand: FilterOperand,
}

/// `column` indexes the context's value columns; `order` is a sort-order ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: usize,
    pub order: u8,
}

/// Everything needed to construct a context. Zero-sided contexts forward plain
/// columns; sided contexts aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextDescriptor {
    Zero {
        filter_op: FilterOp,
        filters: Vec<FilterSpec>,
        columns: Vec<String>,
        sort: Vec<SortSpec>,
    },
    One {
        row_pivots: Vec<String>,
        filter_op: FilterOp,
        filters: Vec<FilterSpec>,
        aggregates: Vec<AggregateSpec>,
        sort: Vec<SortSpec>,
    },
    Two {
        row_pivots: Vec<String>,
        column_pivots: Vec<String>,
        filter_op: FilterOp,
        filters: Vec<FilterSpec>,
        aggregates: Vec<AggregateSpec>,
        sort: Vec<SortSpec>,
    },
}

impl ContextDescriptor {
    pub fn sidedness(&self) -> Sidedness {
        match self {
            ContextDescriptor::Zero { .. } => Sidedness::Zero,
            ContextDescriptor::One { .. } => Sidedness::One,
            ContextDescriptor::Two { .. } => Sidedness::Two,
        }
    }

    pub fn row_pivots(&self) -> &[String] {
        match self {
            ContextDescriptor::Zero { .. } => &[],
            ContextDescriptor::One { row_pivots, .. } | ContextDescriptor::Two { row_pivots, .. } => {
                row_pivots
            }
        }
    }

    pub fn column_pivots(&self) -> &[String] {
        match self {
            ContextDescriptor::Two { column_pivots, .. } => column_pivots,
            _ => &[],
        }
    }

    pub fn filters(&self) -> (FilterOp, &[FilterSpec]) {
        match self {
            ContextDescriptor::Zero { filter_op, filters, .. }
            | ContextDescriptor::One { filter_op, filters, .. }
            | ContextDescriptor::Two { filter_op, filters, .. } => (*filter_op, filters),
        }
    }

    pub fn aggregates(&self) -> &[AggregateSpec] {
        match self {
            ContextDescriptor::Zero { .. } => &[],
            ContextDescriptor::One { aggregates, .. } | ContextDescriptor::Two { aggregates, .. } => {
                aggregates
            }
        }
    }

    pub fn sort(&self) -> &[SortSpec] {
        match self {
            ContextDescriptor::Zero { sort, .. }
            | ContextDescriptor::One { sort, .. }
            | ContextDescriptor::Two { sort, .. } => sort,
        }
    }
}

/// A row-major rectangle of cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Slice {
    pub rows: usize,
    pub stride: usize,
    pub values: Vec<Scalar>,
}

static NULL: Scalar = Scalar::Null;

impl Slice {
    /// Cell at `(r, c)`; reads outside the rectangle yield `Null`.
    pub fn get(&self, r: usize, c: usize) -> &Scalar {
        if c >= self.stride {
            return &NULL;
        }
        self.values.get(r * self.stride + c).unwrap_or(&NULL)
    }
}

/// Change between the last published state of a context and its current state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepDelta {
    pub rows_changed: bool,
    pub columns_changed: bool,
    pub cells: Vec<CellDelta>,
}

/// Opaque columnar aggregation engine.
///
/// Sided contexts reserve context column 0 for the row-pivot key, so
/// `column_dtype` is offset by one for them while `column_names` and
/// `column_count` only describe value columns. For two-sided contexts the value
/// columns are the leaf columns (one per column path and aggregate), and
/// `get_leaf_data` prefixes its result with a header row holding each leaf
/// column's unit-separator joined path.
pub trait EngineCore {
    fn register_gnode(&mut self, spec: TableSpec) -> Result<GnodeId>;
    fn unregister_gnode(&mut self, gnode: GnodeId) -> Result<()>;
    fn table_size(&self, gnode: GnodeId) -> Result<usize>;
    fn table_schema(&self, gnode: GnodeId) -> Result<TableSchema>;
    fn send(&mut self, gnode: GnodeId, batch: ColumnBatch) -> Result<()>;

    fn register_context(
        &mut self,
        gnode: GnodeId,
        name: &str,
        descriptor: ContextDescriptor,
    ) -> Result<ContextId>;
    fn unregister_context(&mut self, ctx: ContextId) -> Result<()>;

    fn sidedness(&self, ctx: ContextId) -> Result<Sidedness>;
    fn column_names(&self, ctx: ContextId) -> Result<Vec<String>>;
    fn column_dtype(&self, ctx: ContextId, idx: usize) -> Result<Dtype>;
    fn row_count(&self, ctx: ContextId) -> Result<usize>;
    fn column_count(&self, ctx: ContextId) -> Result<usize>;
    fn depth(&self, ctx: ContextId, header: Header) -> Result<usize>;
    fn set_depth(&mut self, ctx: ContextId, header: Header, depth: usize) -> Result<()>;
    fn leaf_count(&self, ctx: ContextId, header: Header) -> Result<usize>;

    fn get_data(
        &self,
        ctx: ContextId,
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<Slice>;
    fn get_leaf_data(
        &self,
        ctx: ContextId,
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<Slice>;

    /// Diff rows `[start_row, end_row)` against the last published state, then
    /// publish the current state.
    fn step_delta(&mut self, ctx: ContextId, start_row: usize, end_row: usize) -> Result<StepDelta>;

    /// Names of contexts whose output changed since the previous call.
    fn process(&mut self) -> Result<Vec<String>>;
}
