//! Row predicates.

use std::cmp::Ordering;

use pivotcast_core::error::{Error, Result};
use pivotcast_core::mapper::FilterOp;
use pivotcast_core::types::Scalar;

use super::table::MemTable;
use crate::capability::{FilterOperand, FilterSpec};

/// A filter bound to a column position.
#[derive(Debug, Clone)]
pub(crate) struct BoundFilter {
    column: usize,
    op: FilterOp,
    operand: FilterOperand,
}

pub(crate) fn bind(table: &MemTable, filters: &[FilterSpec]) -> Result<Vec<BoundFilter>> {
    filters
        .iter()
        .map(|f| {
            if matches!(f.op, FilterOp::And | FilterOp::Or) {
                return Err(Error::Construction(format!(
                    "combining operator {:?} used as a predicate on '{}'",
                    f.op, f.column
                )));
            }
            let column = table.position_of(&f.column).ok_or_else(|| {
                Error::Construction(format!("filter column '{}' not in table", f.column))
            })?;
            Ok(BoundFilter {
                column,
                op: f.op,
                operand: f.operand.clone(),
            })
        })
        .collect()
}

/// Rows passing the filters, in storage order. `Or` keeps rows matching any
/// filter; every other combiner requires all of them.
pub(crate) fn select_rows(table: &MemTable, combine: FilterOp, filters: &[BoundFilter]) -> Vec<usize> {
    (0..table.len())
        .filter(|&r| {
            if filters.is_empty() {
                return true;
            }
            let mut results = filters.iter().map(|f| matches(f, &table.columns[f.column][r]));
            match combine {
                FilterOp::Or => results.any(|b| b),
                _ => results.all(|b| b),
            }
        })
        .collect()
}

fn matches(f: &BoundFilter, cell: &Scalar) -> bool {
    let operand = match &f.operand {
        FilterOperand::Scalar(s) => Some(s),
        _ => None,
    };
    match f.op {
        FilterOp::IsNan => matches!(cell, Scalar::Float(v) if v.is_nan()),
        FilterOp::IsNotNan => !matches!(cell, Scalar::Float(v) if v.is_nan()),
        FilterOp::In | FilterOp::NotIn => {
            let found = match &f.operand {
                FilterOperand::List(items) => items.iter().any(|i| i.total_cmp(cell) == Ordering::Equal),
                FilterOperand::Scalar(s) => s.total_cmp(cell) == Ordering::Equal,
                FilterOperand::None => false,
            };
            (f.op == FilterOp::In) == found
        }
        FilterOp::BeginsWith | FilterOp::EndsWith | FilterOp::Contains => {
            let (Some(needle), false) = (operand, cell.is_null()) else {
                return false;
            };
            let hay = cell.label();
            let needle = needle.label();
            match f.op {
                FilterOp::BeginsWith => hay.starts_with(&needle),
                FilterOp::EndsWith => hay.ends_with(&needle),
                _ => hay.contains(&needle),
            }
        }
        FilterOp::Eq | FilterOp::Ne => {
            let eq = match operand {
                Some(o) => o.total_cmp(cell) == Ordering::Equal,
                None => cell.is_null(),
            };
            (f.op == FilterOp::Eq) == eq
        }
        FilterOp::Lt | FilterOp::LtEq | FilterOp::Gt | FilterOp::GtEq => {
            let Some(o) = operand else { return false };
            if cell.is_null() || o.is_null() {
                return false;
            }
            let ord = cell.total_cmp(o);
            match f.op {
                FilterOp::Lt => ord == Ordering::Less,
                FilterOp::LtEq => ord != Ordering::Greater,
                FilterOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
        FilterOp::And | FilterOp::Or => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ColumnBatch, TableSpec};
    use pivotcast_core::mapper::Dtype;

    fn table() -> MemTable {
        let mut t = MemTable::new(TableSpec {
            names: vec!["x".into(), "y".into()],
            types: vec![Dtype::Float64, Dtype::Str],
            index: None,
        })
        .unwrap();
        t.ingest(ColumnBatch {
            record_count: 4,
            names: vec!["x".into(), "y".into()],
            types: vec![Dtype::Float64, Dtype::Str],
            columns: vec![
                vec![1.0.into(), 2.0.into(), f64::NAN.into(), Scalar::Null],
                vec!["apple".into(), "banana".into(), "cherry".into(), "apricot".into()],
            ],
            offset: 0,
        })
        .unwrap();
        t
    }

    fn spec(column: &str, op: FilterOp, operand: FilterOperand) -> FilterSpec {
        FilterSpec {
            column: column.into(),
            op,
            operand,
        }
    }

    #[test]
    fn comparisons_skip_nulls() {
        let t = table();
        let f = bind(&t, &[spec("x", FilterOp::Gt, FilterOperand::Scalar(1.5.into()))]).unwrap();
        assert_eq!(select_rows(&t, FilterOp::And, &f), vec![1, 2]);
    }

    #[test]
    fn string_predicates_and_or_combination() {
        let t = table();
        let f = bind(
            &t,
            &[
                spec("y", FilterOp::BeginsWith, FilterOperand::Scalar("ap".into())),
                spec("y", FilterOp::EndsWith, FilterOperand::Scalar("rry".into())),
            ],
        )
        .unwrap();
        assert_eq!(select_rows(&t, FilterOp::Or, &f), vec![0, 2, 3]);
        assert!(select_rows(&t, FilterOp::And, &f).is_empty());
    }

    #[test]
    fn membership_and_nan() {
        let t = table();
        let f = bind(
            &t,
            &[spec(
                "y",
                FilterOp::NotIn,
                FilterOperand::List(vec!["apple".into(), "banana".into()]),
            )],
        )
        .unwrap();
        assert_eq!(select_rows(&t, FilterOp::And, &f), vec![2, 3]);
        let nan = bind(&t, &[spec("x", FilterOp::IsNan, FilterOperand::None)]).unwrap();
        assert_eq!(select_rows(&t, FilterOp::And, &nan), vec![2]);
    }

    #[test]
    fn combiners_are_not_predicates() {
        let t = table();
        assert!(bind(&t, &[spec("x", FilterOp::And, FilterOperand::None)]).is_err());
        assert!(bind(&t, &[spec("zz", FilterOp::Eq, FilterOperand::None)]).is_err());
    }
}
