#![forbid(unsafe_code)]
//! pivotcast-client: handles an application holds on to.
//!
//! `Engine` owns the channel to a worker and a router thread that delivers
//! worker messages to subscribers. `Table` and `View` are name handles; the
//! worker owns every engine resource behind them.
//!
//! Nothing here blocks: commands are fire-and-forget, and results that need a
//! round trip (`View::to_flat`, `Engine::shutdown`) are futures.

pub mod engine;
pub mod error;
pub mod table;
pub mod view;

pub use engine::Engine;
pub use error::{ClientError, Result};
pub use table::Table;
pub use view::{View, ViewEvent};
