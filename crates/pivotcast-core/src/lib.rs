#![forbid(unsafe_code)]
//! pivotcast-core: shared vocabulary for the client proxies, the worker and the
//! engine capability.
//!
//! Everything here is pure data plus pure functions:
//! - `schema`: logical column types and ordered table schemas
//! - `types`: scalar cell values and row objects
//! - `view_config`: declarative pivot/aggregate/sort/filter configuration
//! - `flat`: flattened snapshots, header spans and cell deltas
//! - `mapper`: logical type / operator tokens <-> engine enumerations
//!
//! No async, no threads, no Arrow here.

pub mod config;
pub mod error;
pub mod flat;
pub mod hash;
pub mod id;
pub mod mapper;
pub mod prelude;
pub mod schema;
pub mod types;
pub mod view_config;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
