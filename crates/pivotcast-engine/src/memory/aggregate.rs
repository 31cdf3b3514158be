//! Aggregate evaluation over a set of row positions.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use pivotcast_core::error::{Error, Result};
use pivotcast_core::mapper::{logical_type_of, AggregateOp, Dtype};
use pivotcast_core::schema::LogicalType;
use pivotcast_core::types::Scalar;

use super::table::{MemTable, OrdScalar};

/// An aggregate bound to column positions.
#[derive(Debug, Clone)]
pub(crate) struct BoundAggregate {
    pub name: String,
    pub op: AggregateOp,
    pub columns: Vec<usize>,
    pub dtype: Dtype,
}

pub(crate) fn bind(table: &MemTable, name: &str, op: AggregateOp, columns: &[String]) -> Result<BoundAggregate> {
    if matches!(
        op,
        AggregateOp::ScaledDiv | AggregateOp::ScaledAdd | AggregateOp::DistinctLeaf
    ) {
        return Err(Error::Construction(format!(
            "aggregate {op:?} is not supported by the in-memory engine"
        )));
    }
    if columns.len() != op.arity() {
        return Err(Error::Construction(format!(
            "aggregate '{name}' takes {} column(s), got {}",
            op.arity(),
            columns.len()
        )));
    }
    let columns = columns
        .iter()
        .map(|c| {
            table
                .position_of(c)
                .ok_or_else(|| Error::Construction(format!("aggregate column '{c}' not in table")))
        })
        .collect::<Result<Vec<_>>>()?;
    let dtype = result_dtype(op, table.types[columns[0]]);
    Ok(BoundAggregate {
        name: name.to_string(),
        op,
        columns,
        dtype,
    })
}

fn result_dtype(op: AggregateOp, input: Dtype) -> Dtype {
    use AggregateOp::*;
    let integral = logical_type_of(input) == Some(LogicalType::Integer);
    match op {
        Count | DistinctCount => Dtype::Int64,
        Sum | Mul | SumAbs | SumNotNull if integral => Dtype::Int64,
        Sum | Mul | SumAbs | SumNotNull => Dtype::Float64,
        Mean | MeanByCount | WeightedMean | Median | PctSumParent | PctSumGrandTotal => {
            Dtype::Float64
        }
        Join => Dtype::Str,
        And | Or => Dtype::Bool,
        Any | Unique | Dominant | First | Last | LastValue | HighWaterMark | LowWaterMark
        | Identity | ScaledDiv | ScaledAdd | DistinctLeaf => input,
    }
}

/// Rows an aggregate sees, plus the wider row sets that percentage aggregates
/// divide by.
pub(crate) struct AggScope<'a> {
    pub rows: &'a [usize],
    pub parent: &'a [usize],
    pub total: &'a [usize],
}

pub(crate) fn evaluate(table: &MemTable, agg: &BoundAggregate, scope: &AggScope<'_>) -> Scalar {
    use AggregateOp::*;
    let col = &table.columns[agg.columns[0]];
    let values = || scope.rows.iter().map(|&r| &col[r]);
    let non_null = || values().filter(|v| !v.is_null());
    let integral = agg.dtype == Dtype::Int64;

    match agg.op {
        Count => Scalar::Int(scope.rows.len() as i64),
        DistinctCount => {
            let distinct: BTreeMap<OrdScalar, ()> =
                non_null().map(|v| (OrdScalar(v.clone()), ())).collect();
            Scalar::Int(distinct.len() as i64)
        }
        Sum | SumNotNull => sum(non_null(), integral, false),
        SumAbs => sum(non_null(), integral, true),
        Mul => {
            if integral {
                Scalar::Int(non_null().filter_map(int_of).fold(1i64, i64::wrapping_mul))
            } else {
                Scalar::Float(non_null().filter_map(Scalar::as_f64).product())
            }
        }
        Mean => mean(non_null().filter_map(Scalar::as_f64)),
        MeanByCount => {
            if scope.rows.is_empty() {
                Scalar::Null
            } else {
                let total: f64 = non_null().filter_map(Scalar::as_f64).sum();
                Scalar::Float(total / scope.rows.len() as f64)
            }
        }
        WeightedMean => {
            let weights = &table.columns[agg.columns[1]];
            let (mut num, mut den) = (0.0, 0.0);
            for &r in scope.rows {
                if let (Some(v), Some(w)) = (col[r].as_f64(), weights[r].as_f64()) {
                    num += v * w;
                    den += w;
                }
            }
            if den == 0.0 {
                Scalar::Null
            } else {
                Scalar::Float(num / den)
            }
        }
        Median => {
            let mut xs: Vec<f64> = non_null().filter_map(Scalar::as_f64).collect();
            if xs.is_empty() {
                return Scalar::Null;
            }
            xs.sort_by(f64::total_cmp);
            let mid = xs.len() / 2;
            if xs.len() % 2 == 0 {
                Scalar::Float((xs[mid - 1] + xs[mid]) / 2.0)
            } else {
                Scalar::Float(xs[mid])
            }
        }
        Join => {
            let distinct: BTreeMap<OrdScalar, ()> =
                non_null().map(|v| (OrdScalar(v.clone()), ())).collect();
            let parts: Vec<String> = distinct.keys().map(|k| k.0.label()).collect();
            Scalar::Str(parts.join(", "))
        }
        Unique => {
            let mut it = non_null();
            match it.next() {
                Some(first) if it.all(|v| v.total_cmp(first) == Ordering::Equal) => first.clone(),
                _ => Scalar::Null,
            }
        }
        Any => non_null().next().cloned().unwrap_or(Scalar::Null),
        Identity => match scope.rows {
            [r] => col[*r].clone(),
            _ => Scalar::Null,
        },
        Dominant => {
            let mut counts: BTreeMap<OrdScalar, usize> = BTreeMap::new();
            for v in non_null() {
                *counts.entry(OrdScalar(v.clone())).or_default() += 1;
            }
            let mut best: Option<(&OrdScalar, usize)> = None;
            for (k, n) in &counts {
                if best.map_or(true, |(_, b)| *n > b) {
                    best = Some((k, *n));
                }
            }
            best.map(|(k, _)| k.0.clone()).unwrap_or(Scalar::Null)
        }
        First => values().next().cloned().unwrap_or(Scalar::Null),
        Last | LastValue => values().last().cloned().unwrap_or(Scalar::Null),
        HighWaterMark => non_null()
            .max_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        LowWaterMark => non_null()
            .min_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        And => Scalar::Bool(non_null().all(|v| v.as_bool().unwrap_or(false))),
        Or => Scalar::Bool(non_null().any(|v| v.as_bool().unwrap_or(false))),
        PctSumParent => pct(col, scope.rows, scope.parent),
        PctSumGrandTotal => pct(col, scope.rows, scope.total),
        ScaledDiv | ScaledAdd | DistinctLeaf => Scalar::Null,
    }
}

fn int_of(v: &Scalar) -> Option<i64> {
    match v {
        Scalar::Int(i) => Some(*i),
        other => other.as_f64().map(|f| f as i64),
    }
}

fn sum<'a>(values: impl Iterator<Item = &'a Scalar>, integral: bool, abs: bool) -> Scalar {
    if integral {
        let total = values
            .filter_map(int_of)
            .map(|i| if abs { i.wrapping_abs() } else { i })
            .fold(0i64, i64::wrapping_add);
        Scalar::Int(total)
    } else {
        let total: f64 = values
            .filter_map(Scalar::as_f64)
            .map(|f| if abs { f.abs() } else { f })
            .sum();
        Scalar::Float(total)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Scalar {
    let (mut total, mut n) = (0.0, 0usize);
    for v in values {
        total += v;
        n += 1;
    }
    if n == 0 {
        Scalar::Null
    } else {
        Scalar::Float(total / n as f64)
    }
}

fn pct(col: &[Scalar], rows: &[usize], denominator: &[usize]) -> Scalar {
    let part: f64 = rows.iter().filter_map(|&r| col[r].as_f64()).sum();
    let whole: f64 = denominator.iter().filter_map(|&r| col[r].as_f64()).sum();
    if whole == 0.0 {
        Scalar::Null
    } else {
        Scalar::Float(part / whole * 100.0)
    }
}
