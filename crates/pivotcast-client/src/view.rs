use std::sync::Arc;

use pivotcast_core::flat::{CellDelta, FlatResult};
use pivotcast_worker::Command;

use crate::engine::Engine;
use crate::error::Result;

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The full state of the view.
    Snapshot(FlatResult),
    /// Cell changes against the last snapshot, in `FlatResult::data` coordinates.
    Update(Vec<CellDelta>),
}

/// Handle to a view living in the worker.
#[derive(Clone)]
pub struct View {
    name: String,
    table_name: String,
    engine: Engine,
}

impl View {
    pub(crate) fn new(name: String, table_name: String, engine: Engine) -> Self {
        Self {
            name,
            table_name,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Register `callback` and request a fresh snapshot for it. Callbacks run
    /// on the router thread in registration order.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ViewEvent) + Send + Sync + 'static,
    {
        self.engine.subscribe(&self.name, Arc::new(callback));
        self.engine.post(Command::ViewSnapshot {
            name: self.name.clone(),
        });
    }

    /// Expand or collapse the row axis, or the column axis of a two-sided
    /// view. Subscribers get a new snapshot.
    pub fn set_depth(&self, depth: usize, is_column: bool) {
        self.engine.post(Command::SetViewDepth {
            name: self.name.clone(),
            depth,
            is_column,
        });
    }

    /// The next snapshot of this view.
    ///
    /// Never resolves if the worker no longer knows the view; resolves with
    /// `ClientError::Closed` when the worker shuts down.
    pub async fn to_flat(&self) -> Result<FlatResult> {
        self.engine.next_snapshot(&self.name).await
    }

    /// Delete the view. No callback of this view runs after this returns.
    pub fn delete(&self) {
        self.engine.post(Command::DeleteView {
            name: self.name.clone(),
            table_name: self.table_name.clone(),
        });
        self.engine.unsubscribe_all(&self.name);
    }
}
