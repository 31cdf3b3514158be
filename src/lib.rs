#![forbid(unsafe_code)]
//! pivotcast: pivot views over live tables, computed in a background worker.
//!
//! This package only gathers the workspace crates; see each of them:
//! - `pivotcast_core`: schemas, scalar values, view configuration, flat snapshots
//! - `pivotcast_engine`: the `EngineCore` capability and `MemoryEngine`
//! - `pivotcast_ingest`: Arrow IPC buffer ingestion
//! - `pivotcast_view`: context building and snapshot flattening
//! - `pivotcast_worker`: the dispatcher and its poll loop
//! - `pivotcast_client`: `Engine`, `Table` and `View` handles

pub use pivotcast_client;
pub use pivotcast_core;
pub use pivotcast_engine;
pub use pivotcast_ingest;
pub use pivotcast_view;
pub use pivotcast_worker;

pub use pivotcast_client::{ClientError, Engine, Table, View, ViewEvent};
