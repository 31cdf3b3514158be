//! Flattened snapshots: the wire shape of a context's current state.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::schema::Schema;
use crate::types::Scalar;

/// Reserved separator between column-path segments in two-sided headers.
pub const UNIT_SEPARATOR: char = '\x1f';

/// A run of identical row header labels at one depth level.
///
/// `child_count` is set on every level above the leaf level: the number of
/// entries on the next level this span covers. On the wire this is
/// `[label, run_length]` or `[label, run_length, child_count]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSpan {
    pub label: Scalar,
    pub run_length: usize,
    pub child_count: Option<usize>,
}

impl RowSpan {
    pub fn new(label: Scalar) -> Self {
        Self {
            label,
            run_length: 0,
            child_count: None,
        }
    }
}

/// A run of identical column path segments at one depth level. `[label, run_length]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColSpan(pub String, pub usize);

impl ColSpan {
    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn run_length(&self) -> usize {
        self.1
    }
}

impl Serialize for RowSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.child_count.is_some() { 3 } else { 2 };
        let mut tup = serializer.serialize_tuple(len)?;
        tup.serialize_element(&self.label)?;
        tup.serialize_element(&self.run_length)?;
        if let Some(c) = self.child_count {
            tup.serialize_element(&c)?;
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for RowSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowSpanVisitor;

        impl<'de> Visitor<'de> for RowSpanVisitor {
            type Value = RowSpan;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[label, run_length] or [label, run_length, child_count]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RowSpan, A::Error> {
                let label = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let run_length = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let child_count = seq.next_element()?;
                Ok(RowSpan {
                    label,
                    run_length,
                    child_count,
                })
            }
        }

        deserializer.deserialize_seq(RowSpanVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatResult {
    pub header: Vec<String>,
    pub row_spans: Vec<Vec<RowSpan>>,
    pub col_spans: Vec<Vec<ColSpan>>,
    pub data: Vec<Vec<Scalar>>,
    pub schema: Schema,
}

impl FlatResult {
    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    /// Apply cell deltas in place. Deltas that fall outside the grid are ignored.
    pub fn apply(&mut self, deltas: &[CellDelta]) {
        for d in deltas {
            if let Some(cell) = self.data.get_mut(d.row).and_then(|r| r.get_mut(d.column)) {
                *cell = d.new_value.clone();
            }
        }
    }
}

/// One changed cell, addressed in `FlatResult::data` coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDelta {
    pub row: usize,
    pub column: usize,
    pub old_value: Scalar,
    pub new_value: Scalar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_span_wire_shape() {
        let leaf = RowSpan {
            label: Scalar::from("a"),
            run_length: 2,
            child_count: None,
        };
        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json, serde_json::json!(["a", 2]));

        let parent = RowSpan {
            child_count: Some(2),
            ..leaf
        };
        let text = serde_json::to_string(&parent).unwrap();
        let back: RowSpan = serde_json::from_str(&text).unwrap();
        assert_eq!(back, parent);
    }

    #[test]
    fn apply_ignores_out_of_range_cells() {
        let mut flat = FlatResult {
            data: vec![vec![Scalar::Int(1), Scalar::Int(2)]],
            ..FlatResult::default()
        };
        flat.apply(&[
            CellDelta {
                row: 0,
                column: 1,
                old_value: Scalar::Int(2),
                new_value: Scalar::Int(5),
            },
            CellDelta {
                row: 9,
                column: 0,
                old_value: Scalar::Null,
                new_value: Scalar::Int(1),
            },
        ]);
        assert_eq!(flat.data, vec![vec![Scalar::Int(1), Scalar::Int(5)]]);
    }
}
