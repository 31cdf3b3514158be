use bytes::Bytes;
use tracing::debug;

use pivotcast_core::id::ViewName;
use pivotcast_core::schema::Schema;
use pivotcast_core::types::Row;
use pivotcast_core::view_config::ViewConfig;
use pivotcast_engine::TableSchema;
use pivotcast_view::context_descriptor;
use pivotcast_worker::{Command, Records};

use crate::engine::Engine;
use crate::error::Result;
use crate::view::View;

/// Handle to a table living in the worker.
#[derive(Clone)]
pub struct Table {
    name: String,
    schema: Schema,
    index: Option<String>,
    engine: Engine,
}

impl Table {
    pub(crate) fn new(name: String, schema: Schema, index: Option<String>, engine: Engine) -> Self {
        Self {
            name,
            schema,
            index,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// The declared schema.
    pub async fn schema(&self) -> Schema {
        self.schema.clone()
    }

    /// Append (or upsert, with an index) row objects. Missing fields are null.
    pub fn update(&self, rows: Vec<Row>) {
        self.engine.post(Command::Update {
            name: self.name.clone(),
            records: Records::Rows(rows),
        });
    }

    /// Ingest an Arrow IPC buffer. The buffer moves to the worker when the
    /// transport allows it and is copied otherwise.
    pub fn update_buffer(&self, buffer: impl Into<Bytes>) {
        let buffer = buffer.into();
        debug!(
            table = %self.name,
            bytes = buffer.len(),
            transferred = self.engine.transferable(),
            "submitting buffer"
        );
        self.engine.post(Command::Update {
            name: self.name.clone(),
            records: Records::Buffer(buffer),
        });
    }

    /// Create a view with a generated name.
    pub fn view(&self, config: ViewConfig) -> Result<View> {
        self.view_named(ViewName::fresh().as_str(), config)
    }

    /// Create a view. The configuration is checked against the declared
    /// schema first, so configuration errors come back here rather than being
    /// logged by the worker.
    pub fn view_named(&self, name: &str, config: ViewConfig) -> Result<View> {
        let schema = TableSchema {
            names: self.schema.names().map(str::to_string).collect(),
            types: Engine::storage_types(&self.schema),
        };
        context_descriptor(&config, &schema)?;
        self.engine.post(Command::CreateView {
            name: name.to_string(),
            table_name: self.name.clone(),
            config,
        });
        Ok(View::new(name.to_string(), self.name.clone(), self.engine.clone()))
    }

    /// Delete the table and, in the worker, every view on it.
    pub fn delete(&self) {
        self.engine.post(Command::DeleteTable {
            name: self.name.clone(),
        });
    }
}
