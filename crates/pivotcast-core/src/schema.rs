//! Logical schema types. Pure data; the engine's storage dtypes live in `mapper`.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The logical column types an application declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Float,
    Integer,
    Boolean,
    Date,
    Datetime,
}

impl LogicalType {
    pub const ALL: [LogicalType; 6] = [
        LogicalType::String,
        LogicalType::Float,
        LogicalType::Integer,
        LogicalType::Boolean,
        LogicalType::Date,
        LogicalType::Datetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Float => "float",
            LogicalType::Integer => "integer",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Datetime => "datetime",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        LogicalType::ALL.into_iter().find(|t| t.as_str() == token)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping from column name to logical type.
///
/// Keys are unique; insertion order is the default column order. Serializes as
/// a map whose entry order follows insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<(String, LogicalType)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or retype a column. A retyped column keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, ty: LogicalType) {
        let name = name.into();
        match self.index_of(&name) {
            Some(idx) => self.columns[idx].1 = ty,
            None => self.columns.push((name, ty)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, ty: LogicalType) -> Self {
        self.insert(name, ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<LogicalType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn types(&self) -> impl Iterator<Item = LogicalType> + '_ {
        self.columns.iter().map(|(_, t)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LogicalType)> + '_ {
        self.columns.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, LogicalType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (S, LogicalType)>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for (name, ty) in iter {
            schema.insert(name, ty);
        }
        schema
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, ty) in &self.columns {
            map.serialize_entry(name, ty)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column name to logical type")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
                let mut schema = Schema::new();
                while let Some((name, ty)) = access.next_entry::<String, LogicalType>()? {
                    schema.insert(name, ty);
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_column_order() {
        let schema = Schema::new()
            .with("z", LogicalType::Integer)
            .with("a", LogicalType::String)
            .with("m", LogicalType::Float);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn retyping_keeps_position_and_uniqueness() {
        let mut schema = Schema::new()
            .with("x", LogicalType::Integer)
            .with("y", LogicalType::String);
        schema.insert("x", LogicalType::Float);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("x"), Some(0));
        assert_eq!(schema.get("x"), Some(LogicalType::Float));
    }

    #[test]
    fn json_roundtrip_preserves_order() {
        let schema = Schema::new()
            .with("y", LogicalType::String)
            .with("x", LogicalType::Datetime);
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"{"y":"string","x":"datetime"}"#);
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn parse_logical_tokens() {
        for ty in LogicalType::ALL {
            assert_eq!(LogicalType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(LogicalType::parse("decimal"), None);
    }
}
