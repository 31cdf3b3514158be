#![forbid(unsafe_code)]
//! pivotcast-engine: the Engine Core capability and an in-memory implementation.
//!
//! - `capability`: the `EngineCore` trait plus the descriptors and slices it
//!   exchanges with the protocol layer
//! - `memory`: `MemoryEngine`, a columnar reference engine used by the worker by
//!   default, by the CLI and by tests

pub mod capability;
pub mod memory;

pub use capability::{
    AggregateSpec, ColumnBatch, ContextDescriptor, EngineCore, FilterOperand, FilterSpec, Header,
    Slice, SortSpec, StepDelta, TableSchema, TableSpec,
};
pub use memory::MemoryEngine;
