#![forbid(unsafe_code)]
//! pivotcast-worker: the Dispatcher side of the pivotcast protocol.
//!
//! - `protocol`: inbound commands and outbound messages
//! - `host`: `WorkerHost`, which owns the table and view registries and runs
//!   every command against an `EngineCore`
//! - `runtime`: the Booting -> Ready -> ShuttingDown loop, the poll timer and
//!   the worker thread
//!
//! All registry state lives inside one `WorkerHost` on one thread; nothing here
//! is shared or locked.

pub mod error;
pub mod failpoints;
pub mod host;
pub mod metrics;
pub mod protocol;
pub mod runtime;

pub use error::WorkerError;
pub use host::{Flow, WorkerHost};
pub use protocol::{Command, Inbound, Outbound, Records};
pub use runtime::{run_worker, spawn_memory_worker, spawn_worker, WorkerHandle};
