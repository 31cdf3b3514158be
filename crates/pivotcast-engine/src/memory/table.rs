//! Columnar table storage with append-at-offset and keyed upsert.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use pivotcast_core::error::{Error, Result};
use pivotcast_core::mapper::{logical_type_of, Dtype};
use pivotcast_core::schema::LogicalType;
use pivotcast_core::types::Scalar;

use crate::capability::{ColumnBatch, TableSchema, TableSpec};

/// Scalar with a total order, usable as a map key.
#[derive(Debug, Clone)]
pub(crate) struct OrdScalar(pub Scalar);

impl PartialEq for OrdScalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrdScalar {}

impl PartialOrd for OrdScalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdScalar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug)]
pub(crate) struct MemTable {
    pub names: Vec<String>,
    pub types: Vec<Dtype>,
    pub index: Option<usize>,
    pub columns: Vec<Vec<Scalar>>,
    keys: BTreeMap<OrdScalar, usize>,
}

impl MemTable {
    pub fn new(spec: TableSpec) -> Result<Self> {
        if spec.names.len() != spec.types.len() {
            return Err(Error::Construction(format!(
                "{} column names but {} types",
                spec.names.len(),
                spec.types.len()
            )));
        }
        for (i, n) in spec.names.iter().enumerate() {
            if spec.names[..i].contains(n) {
                return Err(Error::Construction(format!("duplicate column '{n}'")));
            }
        }
        let index = match spec.index.as_deref() {
            None | Some("") => None,
            Some(ix) => Some(
                spec.names
                    .iter()
                    .position(|n| n == ix)
                    .ok_or_else(|| Error::Construction(format!("index column '{ix}' not in schema")))?,
            ),
        };
        let columns = vec![Vec::new(); spec.names.len()];
        Ok(Self {
            names: spec.names,
            types: spec.types,
            index,
            columns,
            keys: BTreeMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema {
            names: self.names.clone(),
            types: self.types.clone(),
        }
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn logical(&self, col: usize) -> LogicalType {
        logical_type_of(self.types[col]).unwrap_or(LogicalType::String)
    }

    /// Record key of a stored row: its primary key, or its position.
    pub fn record_key(&self, row: usize) -> Scalar {
        match self.index {
            Some(ix) => self.columns[ix][row].clone(),
            None => Scalar::Int(row as i64),
        }
    }

    /// Write a batch. Columns the table does not declare are ignored; declared
    /// columns absent from the batch are left untouched on existing rows and
    /// null on new ones.
    pub fn ingest(&mut self, batch: ColumnBatch) -> Result<()> {
        let mapping: Vec<(usize, usize)> = batch
            .names
            .iter()
            .enumerate()
            .filter_map(|(src, n)| self.position_of(n).map(|dst| (src, dst)))
            .collect();

        let key = match self.index {
            Some(ix) => {
                let src = mapping
                    .iter()
                    .find(|(_, dst)| *dst == ix)
                    .map(|(src, _)| *src)
                    .ok_or_else(|| {
                        Error::Construction(format!(
                            "update is missing index column '{}'",
                            self.names[ix]
                        ))
                    })?;
                Some((src, ix))
            }
            None => None,
        };

        let mut columns = batch.columns;
        for r in 0..batch.record_count {
            let target = match key {
                Some((src, dst)) => {
                    let k = columns
                        .get(src)
                        .and_then(|c| c.get(r))
                        .cloned()
                        .unwrap_or(Scalar::Null)
                        .coerce(self.logical(dst));
                    match self.keys.get(&OrdScalar(k.clone())) {
                        Some(pos) => *pos,
                        None => {
                            let pos = self.push_null_row();
                            self.keys.insert(OrdScalar(k), pos);
                            pos
                        }
                    }
                }
                None => {
                    let pos = batch.offset + r;
                    while self.len() <= pos {
                        self.push_null_row();
                    }
                    pos
                }
            };
            for (src, dst) in &mapping {
                let ty = self.logical(*dst);
                self.columns[*dst][target] = take(&mut columns, *src, r).coerce(ty);
            }
        }
        Ok(())
    }

    fn push_null_row(&mut self) -> usize {
        let pos = self.len();
        for col in &mut self.columns {
            col.push(Scalar::Null);
        }
        pos
    }
}

fn take(columns: &mut [Vec<Scalar>], col: usize, row: usize) -> Scalar {
    columns
        .get_mut(col)
        .and_then(|c| c.get_mut(row))
        .map(std::mem::take)
        .unwrap_or(Scalar::Null)
}
