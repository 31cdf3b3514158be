//! The Dispatcher: one entry point for every command, plus the poll step.
//!
//! `WorkerHost` exclusively owns the engine and both registries. A handler
//! that fails is logged and dropped; a handler that panics is caught, logged
//! and dropped. Either way the next command is handled normally.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, error, info_span, trace, warn};

use pivotcast_core::error::{Error, ResourceKind, Result};
use pivotcast_core::id::{ContextId, GnodeId};
use pivotcast_core::mapper::{to_storage_type, Dtype};
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::{Sidedness, ViewConfig};
use pivotcast_engine::{ColumnBatch, EngineCore, Header, TableSpec};
use pivotcast_ingest::load_arrow_buffer;
use pivotcast_view::{build_context, flat_snapshot};

use crate::fail_point;
use crate::metrics::emit_event;
use crate::protocol::{Command, Outbound, Records};

#[derive(Debug, Clone)]
struct TableEntry {
    names: Vec<String>,
    types: Vec<Dtype>,
    index: Option<String>,
    gnode: GnodeId,
}

#[derive(Debug, Clone)]
struct ViewEntry {
    table: String,
    context: ContextId,
    sidedness: Sidedness,
}

/// Whether the dispatch loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct WorkerHost<E> {
    engine: E,
    tables: HashMap<String, TableEntry>,
    views: HashMap<String, ViewEntry>,
}

impl<E: EngineCore> WorkerHost<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            tables: HashMap::new(),
            views: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    /// Handle one command, appending any outbound messages to `out`.
    pub fn dispatch(&mut self, cmd: Command, out: &mut Vec<Outbound>) -> Flow {
        if cmd == Command::Shutdown {
            return Flow::Shutdown;
        }
        let tag = cmd.tag();
        let span = info_span!("command", cmd = tag);
        let _guard = span.enter();

        match catch_unwind(AssertUnwindSafe(|| self.execute(cmd, out))) {
            Ok(Ok(())) => emit_event("command_handled", &[("cmd", tag.to_string())]),
            Ok(Err(e)) if e.is_not_found() => warn!(error = %e, "skipping command"),
            Ok(Err(e)) => error!(error = %e, "command failed"),
            Err(panic) => error!(reason = panic_message(&*panic), "command panicked"),
        }
        Flow::Continue
    }

    fn execute(&mut self, cmd: Command, out: &mut Vec<Outbound>) -> Result<()> {
        match cmd {
            Command::CreateTable {
                name,
                names,
                types,
                index,
            } => self.create_table(name, names, &types, index),
            Command::DeleteTable { name } => self.delete_table(&name),
            Command::Update { name, records } => self.update(&name, records),
            Command::CreateView {
                name,
                table_name,
                config,
            } => self.create_view(name, table_name, &config),
            Command::DeleteView { name, .. } => self.delete_view(&name),
            Command::ViewSnapshot { name } => self.view_snapshot(&name, out),
            Command::SetViewDepth {
                name,
                depth,
                is_column,
            } => self.set_view_depth(&name, depth, is_column, out),
            Command::Shutdown => Ok(()),
        }
    }

    fn create_table(
        &mut self,
        name: String,
        names: Vec<String>,
        types: &[String],
        index: Option<String>,
    ) -> Result<()> {
        fail_point!("panic_create_table");
        if self.tables.contains_key(&name) {
            return Err(Error::Construction(format!("table '{name}' already exists")));
        }
        let types: Vec<Dtype> = types.iter().map(|t| to_storage_type(t)).collect();
        let index = index.filter(|i| !i.is_empty());
        let gnode = self.engine.register_gnode(TableSpec {
            names: names.clone(),
            types: types.clone(),
            index: index.clone(),
        })?;
        debug!(table = %name, %gnode, "table registered");
        self.tables.insert(
            name,
            TableEntry {
                names,
                types,
                index,
                gnode,
            },
        );
        Ok(())
    }

    fn delete_table(&mut self, name: &str) -> Result<()> {
        let gnode = self
            .tables
            .get(name)
            .ok_or_else(|| Error::not_found(ResourceKind::Table, name))?
            .gnode;
        let orphaned: Vec<String> = self
            .views
            .iter()
            .filter(|(_, v)| v.table == name)
            .map(|(n, _)| n.clone())
            .collect();
        // Registry entries go only once the engine has released them.
        for view in orphaned {
            if let Some(ctx) = self.views.get(&view).map(|v| v.context) {
                self.engine.unregister_context(ctx)?;
                self.views.remove(&view);
            }
        }
        self.engine.unregister_gnode(gnode)?;
        self.tables.remove(name);
        Ok(())
    }

    fn update(&mut self, name: &str, records: Records) -> Result<()> {
        let entry = self
            .tables
            .get(name)
            .ok_or_else(|| Error::not_found(ResourceKind::Table, name))?;

        let mut batch = match records {
            Records::Rows(rows) => ColumnBatch {
                record_count: rows.len(),
                names: entry.names.clone(),
                types: entry.types.clone(),
                columns: entry
                    .names
                    .iter()
                    .map(|col| {
                        rows.iter()
                            .map(|r| r.get(col).cloned().unwrap_or(Scalar::Null))
                            .collect()
                    })
                    .collect(),
                offset: 0,
            },
            Records::Buffer(buf) => {
                let loaded = load_arrow_buffer(&buf)?;
                ColumnBatch {
                    record_count: loaded.record_count,
                    names: loaded.names,
                    types: loaded.types,
                    columns: loaded.columns,
                    offset: 0,
                }
            }
        };
        // Without a primary index every update appends.
        if entry.index.is_none() {
            batch.offset = self.engine.table_size(entry.gnode)?;
        }
        let gnode = entry.gnode;
        emit_event("rows_ingested", &[("count", batch.record_count.to_string())]);
        self.engine.send(gnode, batch)
    }

    fn create_view(&mut self, name: String, table_name: String, config: &ViewConfig) -> Result<()> {
        let gnode = self
            .tables
            .get(&table_name)
            .ok_or_else(|| Error::not_found(ResourceKind::Table, &table_name))?
            .gnode;
        if self.views.contains_key(&name) {
            return Err(Error::Construction(format!("view '{name}' already exists")));
        }
        let built = build_context(&mut self.engine, gnode, &name, config)?;
        self.views.insert(
            name,
            ViewEntry {
                table: table_name,
                context: built.id,
                sidedness: built.sidedness,
            },
        );
        Ok(())
    }

    fn delete_view(&mut self, name: &str) -> Result<()> {
        let view = self
            .views
            .remove(name)
            .ok_or_else(|| Error::not_found(ResourceKind::View, name))?;
        self.engine.unregister_context(view.context)
    }

    fn view(&self, name: &str) -> Result<&ViewEntry> {
        self.views
            .get(name)
            .ok_or_else(|| Error::not_found(ResourceKind::View, name))
    }

    fn view_snapshot(&mut self, name: &str, out: &mut Vec<Outbound>) -> Result<()> {
        let ctx = self.view(name)?.context;
        let snapshot = flat_snapshot(&self.engine, ctx)?;
        // Later deltas are relative to what was just handed out.
        self.engine.step_delta(ctx, 0, 0)?;
        emit_event("snapshot_emitted", &[("view", name.to_string())]);
        out.push(Outbound::Snapshot {
            name: name.to_string(),
            snapshot,
        });
        Ok(())
    }

    fn set_view_depth(
        &mut self,
        name: &str,
        depth: usize,
        is_column: bool,
        out: &mut Vec<Outbound>,
    ) -> Result<()> {
        let view = self.view(name)?;
        let ctx = view.context;
        // One-sided contexts only have a row axis.
        let header = match (view.sidedness, is_column) {
            (Sidedness::Two, true) => Header::Column,
            _ => Header::Row,
        };
        self.engine.set_depth(ctx, header, depth)?;
        self.view_snapshot(name, out)
    }

    /// One poll tick: ask the engine which contexts changed and emit a delta
    /// or a snapshot for each one that still has a view.
    pub fn poll(&mut self, out: &mut Vec<Outbound>) {
        let started = Instant::now();
        match catch_unwind(AssertUnwindSafe(|| self.poll_inner(out))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "poll failed"),
            Err(panic) => error!(reason = panic_message(&*panic), "poll panicked"),
        }
        emit_event(
            "poll",
            &[("micros", started.elapsed().as_micros().to_string())],
        );
    }

    fn poll_inner(&mut self, out: &mut Vec<Outbound>) -> Result<()> {
        fail_point!("panic_poll");
        let updated = self.engine.process()?;
        trace!(count = updated.len(), "poll tick");
        for name in updated {
            let Some(ctx) = self.views.get(&name).map(|v| v.context) else {
                // Deleted since the engine saw the change.
                continue;
            };
            // `process` reports a change once; a failing view must not cost
            // the others theirs.
            match self.poll_view(&name, ctx) {
                Ok(msg) => out.push(msg),
                Err(e) => error!(view = %name, error = %e, "view poll failed"),
            }
        }
        Ok(())
    }

    fn poll_view(&mut self, name: &str, ctx: ContextId) -> Result<Outbound> {
        let rows = self.engine.row_count(ctx)?;
        let delta = self.engine.step_delta(ctx, 0, rows)?;
        let name = name.to_string();
        if delta.rows_changed || delta.columns_changed || delta.cells.is_empty() {
            let snapshot = flat_snapshot(&self.engine, ctx)?;
            emit_event("snapshot_emitted", &[("view", name.clone())]);
            Ok(Outbound::Snapshot { name, snapshot })
        } else {
            emit_event("delta_emitted", &[("cells", delta.cells.len().to_string())]);
            Ok(Outbound::Update {
                name,
                updates: delta.cells,
            })
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
