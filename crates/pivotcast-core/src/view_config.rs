//! Declarative view configuration, as applications write it.

use serde::{Deserialize, Serialize};

/// One dependent column or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    One(String),
    Many(Vec<String>),
}

impl ColumnRef {
    pub fn names(&self) -> Vec<String> {
        match self {
            ColumnRef::One(c) => vec![c.clone()],
            ColumnRef::Many(cs) => cs.clone(),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(v: &str) -> Self {
        ColumnRef::One(v.to_string())
    }
}

impl From<Vec<&str>> for ColumnRef {
    fn from(v: Vec<&str>) -> Self {
        ColumnRef::Many(v.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub column: ColumnRef,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AggregateConfig {
    pub fn new(op: impl Into<String>, column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name, or `op(col1|col2)`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("{}({})", self.op, self.column.names().join("|")),
        }
    }
}

/// 0 = no pivots, 1 = row pivots only, 2 = any column pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sidedness {
    Zero,
    One,
    Two,
}

impl Sidedness {
    pub fn sides(self) -> u8 {
        match self {
            Sidedness::Zero => 0,
            Sidedness::One => 1,
            Sidedness::Two => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_pivot: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_pivot: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Vec<AggregateConfig>>,
    /// `(column index, sort order token)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<(usize, String)>>,
    /// `(column name, operator token, operand)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<(String, String, serde_json::Value)>>,
}

impl ViewConfig {
    pub fn row_pivots(&self) -> &[String] {
        self.row_pivot.as_deref().unwrap_or(&[])
    }

    pub fn column_pivots(&self) -> &[String] {
        self.column_pivot.as_deref().unwrap_or(&[])
    }

    pub fn sidedness(&self) -> Sidedness {
        if !self.column_pivots().is_empty() {
            Sidedness::Two
        } else if !self.row_pivots().is_empty() {
            Sidedness::One
        } else {
            Sidedness::Zero
        }
    }

    pub fn with_row_pivot<S: Into<String>>(mut self, cols: impl IntoIterator<Item = S>) -> Self {
        self.row_pivot = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_column_pivot<S: Into<String>>(mut self, cols: impl IntoIterator<Item = S>) -> Self {
        self.column_pivot = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_aggregate(mut self, agg: AggregateConfig) -> Self {
        self.aggregate.get_or_insert_with(Vec::new).push(agg);
        self
    }

    pub fn with_sort(mut self, column: usize, order: impl Into<String>) -> Self {
        self.sort.get_or_insert_with(Vec::new).push((column, order.into()));
        self
    }

    pub fn with_filter(
        mut self,
        column: impl Into<String>,
        op: impl Into<String>,
        operand: serde_json::Value,
    ) -> Self {
        self.filter
            .get_or_insert_with(Vec::new)
            .push((column.into(), op.into(), operand));
        self
    }
}
