//! Messages between the client proxies and the Dispatcher.
//!
//! Both directions are tagged by a `cmd` field, so a serialized message reads
//! `{"cmd": "create-view", "name": ..., "row_pivot": [...]}`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use pivotcast_core::flat::{CellDelta, FlatResult};
use pivotcast_core::types::Row;
use pivotcast_core::view_config::ViewConfig;

/// Payload of an `update`: row objects, or an Arrow IPC buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Records {
    #[serde(rename = "records")]
    Rows(Vec<Row>),
    #[serde(rename = "buffer")]
    Buffer(Bytes),
}

impl From<Vec<Row>> for Records {
    fn from(rows: Vec<Row>) -> Self {
        Records::Rows(rows)
    }
}

impl From<Bytes> for Records {
    fn from(buf: Bytes) -> Self {
        Records::Buffer(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum Command {
    CreateTable {
        name: String,
        names: Vec<String>,
        /// Logical type tokens, one per name.
        types: Vec<String>,
        #[serde(default)]
        index: Option<String>,
    },
    DeleteTable {
        name: String,
    },
    Update {
        name: String,
        #[serde(flatten)]
        records: Records,
    },
    CreateView {
        name: String,
        table_name: String,
        #[serde(flatten)]
        config: ViewConfig,
    },
    DeleteView {
        name: String,
        table_name: String,
    },
    ViewSnapshot {
        name: String,
    },
    SetViewDepth {
        name: String,
        depth: usize,
        #[serde(rename = "isColumn", default)]
        is_column: bool,
    },
    Shutdown,
}

impl Command {
    /// The `cmd` tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::CreateTable { .. } => "create-table",
            Command::DeleteTable { .. } => "delete-table",
            Command::Update { .. } => "update",
            Command::CreateView { .. } => "create-view",
            Command::DeleteView { .. } => "delete-view",
            Command::ViewSnapshot { .. } => "view-snapshot",
            Command::SetViewDepth { .. } => "set-view-depth",
            Command::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Outbound {
    Snapshot { name: String, snapshot: FlatResult },
    Update { name: String, updates: Vec<CellDelta> },
    ShuttingDown,
}

/// What travels over the worker channel. `Encoded` carries a JSON command and
/// is decoded on the worker side.
#[derive(Debug, Clone)]
pub enum Inbound {
    Command(Command),
    Encoded(Vec<u8>),
}

impl Inbound {
    pub fn decode(self) -> Result<Command, serde_json::Error> {
        match self {
            Inbound::Command(cmd) => Ok(cmd),
            Inbound::Encoded(bytes) => serde_json::from_slice(&bytes),
        }
    }
}
