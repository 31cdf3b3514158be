//! In-memory reference engine.
//!
//! Columnar tables keyed by `GnodeId`, contexts keyed by `ContextId`. Contexts
//! re-materialize eagerly whenever their table changes; `process` reports the
//! ones whose output digest moved since the previous call.

mod aggregate;
mod context;
mod filter;
mod table;

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use pivotcast_core::error::{Error, ResourceKind, Result};
use pivotcast_core::flat::CellDelta;
use pivotcast_core::hash::hash_serde;
use pivotcast_core::id::{ContextId, GnodeId};
use pivotcast_core::mapper::Dtype;
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::Sidedness;

use crate::capability::{
    ColumnBatch, ContextDescriptor, EngineCore, Header, Slice, StepDelta, TableSchema, TableSpec,
};
use context::MemContext;
use table::MemTable;

#[derive(Debug, Default)]
pub struct MemoryEngine {
    next_gnode: u64,
    next_context: u64,
    tables: HashMap<GnodeId, MemTable>,
    contexts: BTreeMap<ContextId, MemContext>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    fn table(&self, gnode: GnodeId) -> Result<&MemTable> {
        self.tables
            .get(&gnode)
            .ok_or_else(|| Error::not_found(ResourceKind::Gnode, gnode))
    }

    fn context(&self, ctx: ContextId) -> Result<&MemContext> {
        self.contexts
            .get(&ctx)
            .ok_or_else(|| Error::not_found(ResourceKind::Context, ctx))
    }

    fn context_mut(&mut self, ctx: ContextId) -> Result<&mut MemContext> {
        self.contexts
            .get_mut(&ctx)
            .ok_or_else(|| Error::not_found(ResourceKind::Context, ctx))
    }
}

/// Copy the rectangle `[sr, er) x [sc, ec)` of a virtual grid, clamped to its
/// extent.
fn rect<F>(rows: usize, width: usize, sr: usize, er: usize, sc: usize, ec: usize, cell: F) -> Slice
where
    F: Fn(usize, usize) -> Scalar,
{
    let er = er.min(rows);
    let sr = sr.min(er);
    let ec = ec.min(width);
    let sc = sc.min(ec);
    let mut values = Vec::with_capacity((er - sr) * (ec - sc));
    for r in sr..er {
        for c in sc..ec {
            values.push(cell(r, c));
        }
    }
    Slice {
        rows: er - sr,
        stride: ec - sc,
        values,
    }
}

impl EngineCore for MemoryEngine {
    fn register_gnode(&mut self, spec: TableSpec) -> Result<GnodeId> {
        let table = MemTable::new(spec)?;
        let id = GnodeId::new(self.next_gnode);
        self.next_gnode += 1;
        self.tables.insert(id, table);
        debug!(gnode = %id, "registered gnode");
        Ok(id)
    }

    fn unregister_gnode(&mut self, gnode: GnodeId) -> Result<()> {
        self.tables
            .remove(&gnode)
            .ok_or_else(|| Error::not_found(ResourceKind::Gnode, gnode))?;
        self.contexts.retain(|_, c| c.gnode != gnode);
        Ok(())
    }

    fn table_size(&self, gnode: GnodeId) -> Result<usize> {
        Ok(self.table(gnode)?.len())
    }

    fn table_schema(&self, gnode: GnodeId) -> Result<TableSchema> {
        Ok(self.table(gnode)?.schema())
    }

    fn send(&mut self, gnode: GnodeId, batch: ColumnBatch) -> Result<()> {
        let table = self
            .tables
            .get_mut(&gnode)
            .ok_or_else(|| Error::not_found(ResourceKind::Gnode, gnode))?;
        table.ingest(batch)?;
        for ctx in self.contexts.values_mut().filter(|c| c.gnode == gnode) {
            ctx.refresh(table)?;
        }
        Ok(())
    }

    fn register_context(
        &mut self,
        gnode: GnodeId,
        name: &str,
        descriptor: ContextDescriptor,
    ) -> Result<ContextId> {
        if self.contexts.values().any(|c| c.name == name) {
            return Err(Error::Construction(format!("context '{name}' already registered")));
        }
        let table = self.table(gnode)?;
        let ctx = MemContext::new(name, gnode, descriptor, table)?;
        let id = ContextId::new(self.next_context);
        self.next_context += 1;
        self.contexts.insert(id, ctx);
        debug!(context = %id, name, "registered context");
        Ok(id)
    }

    fn unregister_context(&mut self, ctx: ContextId) -> Result<()> {
        self.contexts
            .remove(&ctx)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(ResourceKind::Context, ctx))
    }

    fn sidedness(&self, ctx: ContextId) -> Result<Sidedness> {
        Ok(self.context(ctx)?.descriptor.sidedness())
    }

    fn column_names(&self, ctx: ContextId) -> Result<Vec<String>> {
        Ok(self.context(ctx)?.current.column_names.clone())
    }

    fn column_dtype(&self, ctx: ContextId, idx: usize) -> Result<Dtype> {
        let c = self.context(ctx)?;
        let dtypes = &c.current.column_dtypes;
        let found = match c.descriptor.sidedness() {
            Sidedness::Zero => dtypes.get(idx).copied(),
            _ if idx == 0 => Some(Dtype::Str),
            _ => dtypes.get(idx - 1).copied(),
        };
        found.ok_or_else(|| Error::Invariant(format!("column {idx} out of range for {ctx}")))
    }

    fn row_count(&self, ctx: ContextId) -> Result<usize> {
        Ok(self.context(ctx)?.current.data.len())
    }

    fn column_count(&self, ctx: ContextId) -> Result<usize> {
        Ok(self.context(ctx)?.current.column_names.len())
    }

    fn depth(&self, ctx: ContextId, header: Header) -> Result<usize> {
        let c = self.context(ctx)?;
        Ok(match (c.descriptor.sidedness(), header) {
            (Sidedness::Zero, _) => 0,
            (_, Header::Row) => c.row_depth,
            (_, Header::Column) => c.column_depth,
        })
    }

    fn set_depth(&mut self, ctx: ContextId, header: Header, depth: usize) -> Result<()> {
        let gnode = self.context(ctx)?.gnode;
        let table = self
            .tables
            .get(&gnode)
            .ok_or_else(|| Error::not_found(ResourceKind::Gnode, gnode))?;
        let c = self
            .contexts
            .get_mut(&ctx)
            .ok_or_else(|| Error::not_found(ResourceKind::Context, ctx))?;
        match (c.descriptor.sidedness(), header) {
            (Sidedness::Zero, _) => {
                return Err(Error::Config(format!("{ctx} has no pivots to expand")));
            }
            (Sidedness::One, Header::Column) => {
                return Err(Error::Config(format!("{ctx} has no column header")));
            }
            (_, Header::Row) => c.row_depth = depth.min(c.descriptor.row_pivots().len()),
            (_, Header::Column) => c.column_depth = depth.min(c.descriptor.column_pivots().len()),
        }
        c.refresh(table)?;
        c.publish()
    }

    fn leaf_count(&self, ctx: ContextId, header: Header) -> Result<usize> {
        let c = self.context(ctx)?;
        Ok(match header {
            Header::Row => c.current.data.len(),
            Header::Column => c.current.column_names.len(),
        })
    }

    fn get_data(&self, ctx: ContextId, sr: usize, er: usize, sc: usize, ec: usize) -> Result<Slice> {
        let c = self.context(ctx)?;
        let m = &c.current;
        let sided = c.descriptor.sidedness() != Sidedness::Zero;
        let width = m.column_names.len() + usize::from(sided);
        Ok(rect(m.data.len(), width, sr, er, sc, ec, |r, col| {
            if !sided {
                m.data[r][col].clone()
            } else if col == 0 {
                m.row_paths[r].last().cloned().unwrap_or(Scalar::Null)
            } else {
                m.data[r][col - 1].clone()
            }
        }))
    }

    fn get_leaf_data(&self, ctx: ContextId, sr: usize, er: usize, sc: usize, ec: usize) -> Result<Slice> {
        let c = self.context(ctx)?;
        let m = &c.current;
        let prefix = c.row_prefix();
        let width = prefix + m.column_names.len();
        let cell = |r: usize, col: usize| {
            if col < prefix {
                m.row_paths[r].get(col).cloned().unwrap_or(Scalar::Null)
            } else {
                m.data[r][col - prefix].clone()
            }
        };
        if c.descriptor.sidedness() != Sidedness::Two {
            return Ok(rect(m.data.len(), width, sr, er, sc, ec, cell));
        }

        // Two-sided: header row of joined column paths, then the data rows.
        let body = rect(m.data.len(), width, sr, er, sc, ec, cell);
        let ec = ec.min(width);
        let sc = sc.min(ec);
        let mut values: Vec<Scalar> = (sc..ec)
            .map(|col| {
                if col < prefix {
                    Scalar::Str(String::new())
                } else {
                    Scalar::Str(m.column_names[col - prefix].clone())
                }
            })
            .collect();
        values.extend(body.values);
        Ok(Slice {
            rows: body.rows + 1,
            stride: ec - sc,
            values,
        })
    }

    fn step_delta(&mut self, ctx: ContextId, start_row: usize, end_row: usize) -> Result<StepDelta> {
        let c = self.context_mut(ctx)?;
        let (prev, cur) = (&c.published, &c.current);
        let columns_changed =
            prev.column_names != cur.column_names || prev.column_dtypes != cur.column_dtypes;
        let rows_changed = prev.data.len() != cur.data.len() || prev.row_paths != cur.row_paths;

        let mut cells = Vec::new();
        if !rows_changed && !columns_changed {
            for row in start_row..end_row.min(cur.data.len()) {
                for (column, (old, new)) in prev.data[row].iter().zip(&cur.data[row]).enumerate() {
                    if old.total_cmp(new) != std::cmp::Ordering::Equal {
                        cells.push(CellDelta {
                            row,
                            column,
                            old_value: old.clone(),
                            new_value: new.clone(),
                        });
                    }
                }
            }
        }
        c.publish()?;
        Ok(StepDelta {
            rows_changed,
            columns_changed,
            cells,
        })
    }

    fn process(&mut self) -> Result<Vec<String>> {
        let mut updated = Vec::new();
        for c in self.contexts.values_mut() {
            let digest = hash_serde(&c.current)?;
            if c.digest != Some(digest) {
                c.digest = Some(digest);
                updated.push(c.name.clone());
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AggregateSpec, FilterOperand, FilterSpec};
    use pivotcast_core::mapper::{AggregateOp, FilterOp};

    fn engine_with_rows() -> (MemoryEngine, GnodeId) {
        let mut e = MemoryEngine::new();
        let g = e
            .register_gnode(TableSpec {
                names: vec!["x".into(), "y".into()],
                types: vec![Dtype::Int64, Dtype::Str],
                index: None,
            })
            .unwrap();
        e.send(
            g,
            ColumnBatch {
                record_count: 3,
                names: vec!["x".into(), "y".into()],
                types: vec![Dtype::Int64, Dtype::Str],
                columns: vec![
                    vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)],
                    vec!["a".into(), "a".into(), "b".into()],
                ],
                offset: 0,
            },
        )
        .unwrap();
        (e, g)
    }

    fn any_aggs() -> Vec<AggregateSpec> {
        ["x", "y"]
            .iter()
            .map(|c| AggregateSpec {
                name: c.to_string(),
                op: AggregateOp::Any,
                columns: vec![c.to_string()],
            })
            .collect()
    }

    #[test]
    fn one_sided_leaf_data_is_prefixed_by_row_paths() {
        let (mut e, g) = engine_with_rows();
        let ctx = e
            .register_context(
                g,
                "v",
                ContextDescriptor::One {
                    row_pivots: vec!["y".into()],
                    filter_op: FilterOp::And,
                    filters: vec![],
                    aggregates: any_aggs(),
                    sort: vec![],
                },
            )
            .unwrap();
        e.set_depth(ctx, Header::Row, 1).unwrap();
        assert_eq!(e.depth(ctx, Header::Row).unwrap(), 1);
        assert_eq!(e.column_names(ctx).unwrap(), vec!["x", "y"]);
        assert_eq!(e.column_dtype(ctx, 1).unwrap(), Dtype::Int64);

        let slice = e.get_leaf_data(ctx, 0, 3, 0, 4).unwrap();
        assert_eq!(slice.rows, 3);
        assert_eq!(slice.stride, 4);
        assert_eq!(slice.get(0, 0), &Scalar::from("a"));
        assert_eq!(slice.get(0, 1), &Scalar::Int(0));
        assert_eq!(slice.get(2, 2), &Scalar::Int(3));
    }

    #[test]
    fn process_reports_changed_contexts_once() {
        let (mut e, g) = engine_with_rows();
        e.register_context(
            g,
            "v",
            ContextDescriptor::Zero {
                filter_op: FilterOp::And,
                filters: vec![FilterSpec {
                    column: "y".into(),
                    op: FilterOp::Eq,
                    operand: FilterOperand::Scalar("a".into()),
                }],
                columns: vec!["x".into()],
                sort: vec![],
            },
        )
        .unwrap();
        assert!(e.process().unwrap().is_empty());

        let size = e.table_size(g).unwrap();
        e.send(
            g,
            ColumnBatch {
                record_count: 1,
                names: vec!["x".into(), "y".into()],
                types: vec![Dtype::Int64, Dtype::Str],
                columns: vec![vec![Scalar::Int(9)], vec!["a".into()]],
                offset: size,
            },
        )
        .unwrap();
        assert_eq!(e.process().unwrap(), vec!["v".to_string()]);
        assert!(e.process().unwrap().is_empty());
    }

    #[test]
    fn step_delta_reports_cells_when_shape_is_stable() {
        let mut e = MemoryEngine::new();
        let g = e
            .register_gnode(TableSpec {
                names: vec!["k".into(), "v".into()],
                types: vec![Dtype::Str, Dtype::Float64],
                index: Some("k".into()),
            })
            .unwrap();
        let batch = |v: f64| ColumnBatch {
            record_count: 1,
            names: vec!["k".into(), "v".into()],
            types: vec![Dtype::Str, Dtype::Float64],
            columns: vec![vec!["a".into()], vec![Scalar::Float(v)]],
            offset: 0,
        };
        e.send(g, batch(1.0)).unwrap();
        let ctx = e
            .register_context(
                g,
                "v",
                ContextDescriptor::Zero {
                    filter_op: FilterOp::And,
                    filters: vec![],
                    columns: vec!["k".into(), "v".into()],
                    sort: vec![],
                },
            )
            .unwrap();
        e.send(g, batch(2.5)).unwrap();
        let delta = e.step_delta(ctx, 0, 1).unwrap();
        assert!(!delta.rows_changed && !delta.columns_changed);
        assert_eq!(delta.cells.len(), 1);
        assert_eq!(delta.cells[0].new_value, Scalar::Float(2.5));
        assert!(e.step_delta(ctx, 0, 1).unwrap().cells.is_empty());

        e.send(g, ColumnBatch { columns: vec![vec!["b".into()], vec![Scalar::Float(0.0)]], ..batch(0.0) })
            .unwrap();
        assert!(e.step_delta(ctx, 0, 2).unwrap().rows_changed);
    }

    #[test]
    fn two_sided_leaf_data_starts_with_header_row() {
        let (mut e, g) = engine_with_rows();
        let ctx = e
            .register_context(
                g,
                "v",
                ContextDescriptor::Two {
                    row_pivots: vec!["y".into()],
                    column_pivots: vec!["y".into()],
                    filter_op: FilterOp::And,
                    filters: vec![],
                    aggregates: vec![AggregateSpec {
                        name: "n".into(),
                        op: AggregateOp::Count,
                        columns: vec!["x".into()],
                    }],
                    sort: vec![],
                },
            )
            .unwrap();
        e.set_depth(ctx, Header::Column, 1).unwrap();
        assert_eq!(e.leaf_count(ctx, Header::Column).unwrap(), 2);
        let slice = e.get_leaf_data(ctx, 0, 2, 0, 3).unwrap();
        assert_eq!(slice.rows, 3);
        assert_eq!(slice.get(0, 1), &Scalar::from("a\u{1f}n"));
        assert_eq!(slice.get(1, 0), &Scalar::from("a"));
        assert_eq!(slice.get(1, 1), &Scalar::Int(2));
        assert_eq!(slice.get(1, 2), &Scalar::Int(0));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut e = MemoryEngine::new();
        assert!(e.table_size(GnodeId::new(7)).unwrap_err().is_not_found());
        assert!(e.unregister_context(ContextId::new(7)).unwrap_err().is_not_found());
        let (mut e2, g) = engine_with_rows();
        e2.unregister_gnode(g).unwrap();
        assert_eq!(e2.table_count(), 0);
    }

    #[test]
    fn depth_on_zero_sided_is_a_config_error() {
        let (mut e, g) = engine_with_rows();
        let ctx = e
            .register_context(
                g,
                "z",
                ContextDescriptor::Zero {
                    filter_op: FilterOp::And,
                    filters: vec![],
                    columns: vec!["x".into()],
                    sort: vec![],
                },
            )
            .unwrap();
        assert!(matches!(e.set_depth(ctx, Header::Row, 1), Err(Error::Config(_))));
        assert!(e.register_context(g, "z", ContextDescriptor::Zero {
            filter_op: FilterOp::And,
            filters: vec![],
            columns: vec!["x".into()],
            sort: vec![],
        })
        .is_err());
    }
}
