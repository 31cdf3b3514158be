//! Context materialization: filter, group by row/column pivots, aggregate.
//!
//! A context keeps two materialized states. `current` follows every table
//! change; `published` is what the last snapshot or delta handed out, and is
//! the base that cell deltas are computed against.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use pivotcast_core::error::{Error, Result};
use pivotcast_core::flat::UNIT_SEPARATOR;
use pivotcast_core::hash::{hash_serde, Hash256};
use pivotcast_core::id::GnodeId;
use pivotcast_core::mapper::{Dtype, SortOrder};
use pivotcast_core::types::Scalar;

use super::aggregate::{self, AggScope, BoundAggregate};
use super::filter;
use super::table::{MemTable, OrdScalar};
use crate::capability::{ContextDescriptor, SortSpec};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct Materialized {
    /// Value column names; for two-sided contexts, joined leaf column paths.
    pub column_names: Vec<String>,
    pub column_dtypes: Vec<Dtype>,
    /// Per leaf row, the labels of its path (expansion depth + 1 entries).
    pub row_paths: Vec<Vec<Scalar>>,
    pub data: Vec<Vec<Scalar>>,
}

#[derive(Debug)]
pub(crate) struct MemContext {
    pub name: String,
    pub gnode: GnodeId,
    pub descriptor: ContextDescriptor,
    pub row_depth: usize,
    pub column_depth: usize,
    pub current: Materialized,
    pub published: Materialized,
    pub digest: Option<Hash256>,
}

impl MemContext {
    pub fn new(name: &str, gnode: GnodeId, descriptor: ContextDescriptor, table: &MemTable) -> Result<Self> {
        let mut ctx = Self {
            name: name.to_string(),
            gnode,
            descriptor,
            row_depth: 0,
            column_depth: 0,
            current: Materialized::default(),
            published: Materialized::default(),
            digest: None,
        };
        ctx.refresh(table)?;
        ctx.publish()?;
        Ok(ctx)
    }

    pub fn refresh(&mut self, table: &MemTable) -> Result<()> {
        self.current = materialize(table, &self.descriptor, self.row_depth, self.column_depth)?;
        Ok(())
    }

    /// Mark the current state as handed out.
    pub fn publish(&mut self) -> Result<()> {
        self.published = self.current.clone();
        self.digest = Some(hash_serde(&self.current)?);
        Ok(())
    }

    /// Width of the row-path prefix in leaf data.
    pub fn row_prefix(&self) -> usize {
        match self.descriptor {
            ContextDescriptor::Zero { .. } => 0,
            _ => self.row_depth + 1,
        }
    }
}

fn positions(table: &MemTable, names: &[String], what: &str) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|n| {
            table
                .position_of(n)
                .ok_or_else(|| Error::Construction(format!("{what} column '{n}' not in table")))
        })
        .collect()
}

pub(crate) fn materialize(
    table: &MemTable,
    descriptor: &ContextDescriptor,
    row_depth: usize,
    column_depth: usize,
) -> Result<Materialized> {
    let (combine, filters) = descriptor.filters();
    let bound = filter::bind(table, filters)?;
    let rows = filter::select_rows(table, combine, &bound);

    if let ContextDescriptor::Zero { columns, sort, .. } = descriptor {
        let cols = positions(table, columns, "view")?;
        let mut rows = rows;
        rows.sort_by(|&a, &b| {
            compare_by(sort, cols.len(), |spec| {
                let c = cols[spec.column];
                (table.columns[c][a].clone(), table.columns[c][b].clone())
            })
        });
        return Ok(Materialized {
            column_names: columns.clone(),
            column_dtypes: cols.iter().map(|&c| table.types[c]).collect(),
            row_paths: Vec::new(),
            data: rows
                .iter()
                .map(|&r| cols.iter().map(|&c| table.columns[c][r].clone()).collect())
                .collect(),
        });
    }

    let row_pivots = positions(table, descriptor.row_pivots(), "row pivot")?;
    let col_pivots = positions(table, descriptor.column_pivots(), "column pivot")?;
    let aggs = descriptor
        .aggregates()
        .iter()
        .map(|a| aggregate::bind(table, &a.name, a.op, &a.columns))
        .collect::<Result<Vec<_>>>()?;

    let tree = RowTree {
        table,
        pivots: &row_pivots,
        depth: row_depth.min(row_pivots.len()),
        aggs: &aggs,
        sort: descriptor.sort(),
        total: &rows,
    };
    let mut leaves = Vec::new();
    tree.collect(&rows, &mut Vec::new(), &mut leaves);

    let two_sided = matches!(descriptor, ContextDescriptor::Two { .. });
    let col_paths = if two_sided {
        column_paths(table, &col_pivots[..column_depth.min(col_pivots.len())], &rows)
    } else {
        vec![Vec::new()]
    };

    let sep = UNIT_SEPARATOR.to_string();
    let mut column_names = Vec::new();
    let mut column_dtypes = Vec::new();
    for path in &col_paths {
        for agg in &aggs {
            if two_sided {
                let mut segments: Vec<String> = path.iter().map(Scalar::label).collect();
                segments.push(agg.name.clone());
                column_names.push(segments.join(sep.as_str()));
            } else {
                column_names.push(agg.name.clone());
            }
            column_dtypes.push(agg.dtype);
        }
    }

    let col_depth = column_depth.min(col_pivots.len());
    let in_path = |r: usize, path: &[Scalar]| {
        col_pivots[..col_depth]
            .iter()
            .zip(path)
            .all(|(&c, v)| table.columns[c][r].total_cmp(v) == Ordering::Equal)
    };
    let restrict = |rows: &[usize], path: &[Scalar]| -> Vec<usize> {
        rows.iter().copied().filter(|&r| in_path(r, path)).collect()
    };

    let mut data = Vec::with_capacity(leaves.len());
    let mut row_paths = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let mut values = Vec::with_capacity(column_names.len());
        for path in &col_paths {
            let (rows_in, parent_in, total_in) = if path.is_empty() {
                (leaf.rows.clone(), leaf.parent.clone(), rows.clone())
            } else {
                (
                    restrict(&leaf.rows, path),
                    restrict(&leaf.parent, path),
                    restrict(&rows, path),
                )
            };
            let scope = AggScope {
                rows: &rows_in,
                parent: &parent_in,
                total: &total_in,
            };
            for agg in &aggs {
                values.push(aggregate::evaluate(table, agg, &scope));
            }
        }
        row_paths.push(leaf.path);
        data.push(values);
    }

    Ok(Materialized {
        column_names,
        column_dtypes,
        row_paths,
        data,
    })
}

struct Leaf {
    path: Vec<Scalar>,
    rows: Vec<usize>,
    parent: Vec<usize>,
}

struct RowTree<'a> {
    table: &'a MemTable,
    pivots: &'a [usize],
    depth: usize,
    aggs: &'a [BoundAggregate],
    sort: &'a [SortSpec],
    total: &'a [usize],
}

impl RowTree<'_> {
    /// Walk the pivot levels down to the expansion depth; the level below it is
    /// the leaf level. Beneath the last pivot the leaves are individual records.
    fn collect(&self, rows: &[usize], path: &mut Vec<Scalar>, out: &mut Vec<Leaf>) {
        let level = path.len();
        let groups = if level < self.pivots.len() {
            self.group_by_pivot(rows, self.pivots[level])
        } else {
            rows.iter()
                .map(|&r| (self.table.record_key(r), vec![r]))
                .collect()
        };
        let groups = self.sorted(groups, rows);

        for (key, members) in groups {
            path.push(key);
            if level == self.depth {
                out.push(Leaf {
                    path: path.clone(),
                    rows: members,
                    parent: rows.to_vec(),
                });
            } else {
                self.collect(&members, path, out);
            }
            path.pop();
        }
    }

    fn group_by_pivot(&self, rows: &[usize], col: usize) -> Vec<(Scalar, Vec<usize>)> {
        let mut groups: BTreeMap<OrdScalar, Vec<usize>> = BTreeMap::new();
        for &r in rows {
            groups
                .entry(OrdScalar(self.table.columns[col][r].clone()))
                .or_default()
                .push(r);
        }
        groups.into_iter().map(|(k, v)| (k.0, v)).collect()
    }

    /// Stable sort of sibling groups by their aggregate values.
    fn sorted(&self, groups: Vec<(Scalar, Vec<usize>)>, parent: &[usize]) -> Vec<(Scalar, Vec<usize>)> {
        let active = self
            .sort
            .iter()
            .any(|s| s.column < self.aggs.len() && SortOrder::from_index(s.order) != Some(SortOrder::None));
        if !active {
            return groups;
        }
        let keyed: Vec<(Vec<Scalar>, (Scalar, Vec<usize>))> = groups
            .into_iter()
            .map(|g| {
                let scope = AggScope {
                    rows: &g.1,
                    parent,
                    total: self.total,
                };
                let keys = self
                    .aggs
                    .iter()
                    .map(|a| aggregate::evaluate(self.table, a, &scope))
                    .collect();
                (keys, g)
            })
            .collect();
        let mut keyed = keyed;
        keyed.sort_by(|a, b| {
            compare_by(self.sort, self.aggs.len(), |spec| {
                (a.0[spec.column].clone(), b.0[spec.column].clone())
            })
        });
        keyed.into_iter().map(|(_, g)| g).collect()
    }
}

/// Distinct column-pivot paths among `rows`, in ascending order.
fn column_paths(table: &MemTable, pivots: &[usize], rows: &[usize]) -> Vec<Vec<Scalar>> {
    if pivots.is_empty() {
        return vec![Vec::new()];
    }
    let mut paths: BTreeMap<Vec<OrdScalar>, ()> = BTreeMap::new();
    for &r in rows {
        let key = pivots
            .iter()
            .map(|&c| OrdScalar(table.columns[c][r].clone()))
            .collect();
        paths.insert(key, ());
    }
    paths
        .into_keys()
        .map(|k| k.into_iter().map(|s| s.0).collect())
        .collect()
}

/// Compare two items under a sort specification. `width` bounds valid column
/// indices; `pick` yields the pair of values for one spec.
fn compare_by<F>(sort: &[SortSpec], width: usize, mut pick: F) -> Ordering
where
    F: FnMut(&SortSpec) -> (Scalar, Scalar),
{
    for spec in sort {
        if spec.column >= width {
            continue;
        }
        let order = match SortOrder::from_index(spec.order) {
            Some(SortOrder::None) | None => continue,
            Some(o) => o,
        };
        let (a, b) = pick(spec);
        let ord = match order {
            SortOrder::AscAbs | SortOrder::DescAbs => abs_of(&a).total_cmp(&abs_of(&b)),
            _ => a.total_cmp(&b),
        };
        let ord = match order {
            SortOrder::Desc | SortOrder::DescAbs => ord.reverse(),
            _ => ord,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn abs_of(v: &Scalar) -> Scalar {
    match v {
        Scalar::Int(i) => Scalar::Int(i.wrapping_abs()),
        Scalar::Float(f) => Scalar::Float(f.abs()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AggregateSpec, ColumnBatch, TableSpec};
    use pivotcast_core::mapper::{AggregateOp, FilterOp};

    fn table() -> MemTable {
        let mut t = MemTable::new(TableSpec {
            names: vec!["x".into(), "y".into(), "z".into()],
            types: vec![Dtype::Int64, Dtype::Str, Dtype::Str],
            index: None,
        })
        .unwrap();
        t.ingest(ColumnBatch {
            record_count: 4,
            names: vec!["x".into(), "y".into(), "z".into()],
            types: vec![Dtype::Int64, Dtype::Str, Dtype::Str],
            columns: vec![
                vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3), Scalar::Int(4)],
                vec!["a".into(), "a".into(), "b".into(), "b".into()],
                vec!["p".into(), "q".into(), "p".into(), "p".into()],
            ],
            offset: 0,
        })
        .unwrap();
        t
    }

    fn sum_x() -> Vec<AggregateSpec> {
        vec![AggregateSpec {
            name: "sum(x)".into(),
            op: AggregateOp::Sum,
            columns: vec!["x".into()],
        }]
    }

    #[test]
    fn zero_sided_forwards_columns_sorted() {
        let t = table();
        let m = materialize(
            &t,
            &ContextDescriptor::Zero {
                filter_op: FilterOp::And,
                filters: vec![],
                columns: vec!["y".into(), "x".into()],
                sort: vec![SortSpec { column: 1, order: 1 }],
            },
            0,
            0,
        )
        .unwrap();
        assert_eq!(m.column_names, vec!["y", "x"]);
        assert_eq!(m.data[0], vec![Scalar::from("b"), Scalar::Int(4)]);
        assert_eq!(m.data.len(), 4);
    }

    #[test]
    fn one_sided_leaf_level_sits_below_expansion_depth() {
        let t = table();
        let desc = ContextDescriptor::One {
            row_pivots: vec!["y".into(), "z".into()],
            filter_op: FilterOp::And,
            filters: vec![],
            aggregates: sum_x(),
            sort: vec![],
        };
        let collapsed = materialize(&t, &desc, 0, 0).unwrap();
        assert_eq!(
            collapsed.row_paths,
            vec![vec![Scalar::from("a")], vec![Scalar::from("b")]]
        );
        assert_eq!(collapsed.data, vec![vec![Scalar::Int(3)], vec![Scalar::Int(7)]]);

        let full = materialize(&t, &desc, 2, 0).unwrap();
        assert_eq!(full.row_paths.len(), 4);
        assert_eq!(
            full.row_paths[1],
            vec![Scalar::from("a"), Scalar::from("q"), Scalar::Int(1)]
        );
    }

    #[test]
    fn two_sided_columns_are_joined_paths() {
        let t = table();
        let desc = ContextDescriptor::Two {
            row_pivots: vec!["y".into()],
            column_pivots: vec!["z".into()],
            filter_op: FilterOp::And,
            filters: vec![],
            aggregates: sum_x(),
            sort: vec![],
        };
        let m = materialize(&t, &desc, 0, 1).unwrap();
        assert_eq!(m.column_names, vec!["p\u{1f}sum(x)", "q\u{1f}sum(x)"]);
        assert_eq!(
            m.data,
            vec![
                vec![Scalar::Int(1), Scalar::Int(2)],
                vec![Scalar::Int(7), Scalar::Int(0)],
            ]
        );
    }

    #[test]
    fn sided_groups_sort_by_aggregate() {
        let t = table();
        let desc = ContextDescriptor::One {
            row_pivots: vec!["y".into()],
            filter_op: FilterOp::And,
            filters: vec![],
            aggregates: sum_x(),
            sort: vec![SortSpec { column: 0, order: 1 }],
        };
        let m = materialize(&t, &desc, 0, 0).unwrap();
        assert_eq!(m.row_paths[0], vec![Scalar::from("b")]);
    }
}
