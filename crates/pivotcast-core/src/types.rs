//! Cell values and row objects.
//!
//! `Scalar` is the plain value every engine cell is materialized into before it
//! leaves the worker. Dates are days since the Unix epoch, datetimes are
//! milliseconds since the Unix epoch.
//!
//! On the wire a `Scalar` is a plain JSON value (`1`, `"a"`, `null`); dates
//! travel as `YYYY-MM-DD` text and datetimes as epoch millis. Decoding is
//! untyped, the receiving table coerces values into its column types.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::schema::LogicalType;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(i32),
    DateTime(i64),
}

/// A row object: column name -> value. Missing columns read as `Scalar::Null`.
pub type Row = BTreeMap<String, Scalar>;

const MS_PER_DAY: i64 = 86_400_000;

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view used by aggregates and numeric comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Date(d) => Some(*d as f64),
            Scalar::DateTime(t) => Some(*t as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Int(i) => Some(*i != 0),
            Scalar::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    /// Text used for header labels and string predicates.
    pub fn label(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Total order: nulls first, then numbers (ints and floats compared
    /// numerically, NaN last among numbers), then the remaining variants by kind.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        use Scalar::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Int(_) | Float(_), Int(_) | Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(f64::NAN), other.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            _ => kind_order(self).cmp(&kind_order(other)),
        }
    }

    /// Coerce into the given logical type. Values that cannot be represented
    /// become `Null`.
    pub fn coerce(self, ty: LogicalType) -> Scalar {
        use Scalar::*;
        match (ty, self) {
            (_, Null) => Null,
            (LogicalType::Integer, Int(i)) => Int(i),
            (LogicalType::Integer, Float(f)) if f.is_finite() => Int(f as i64),
            (LogicalType::Integer, Bool(b)) => Int(b as i64),
            (LogicalType::Integer, Str(s)) => s.trim().parse().map(Int).unwrap_or(Null),
            (LogicalType::Float, Float(f)) => Float(f),
            (LogicalType::Float, Int(i)) => Float(i as f64),
            (LogicalType::Float, Str(s)) => s.trim().parse().map(Float).unwrap_or(Null),
            (LogicalType::Boolean, Bool(b)) => Bool(b),
            (LogicalType::Boolean, Str(s)) => match s.trim() {
                "true" | "True" | "TRUE" | "1" => Bool(true),
                "false" | "False" | "FALSE" | "0" => Bool(false),
                _ => Null,
            },
            (LogicalType::Boolean, v) => v.as_bool().map(Bool).unwrap_or(Null),
            (LogicalType::Date, Date(d)) => Date(d),
            (LogicalType::Date, DateTime(t)) => Date(t.div_euclid(MS_PER_DAY) as i32),
            (LogicalType::Date, Int(i)) => Date(i as i32),
            (LogicalType::Date, Str(s)) => parse_date(&s).map(Date).unwrap_or(Null),
            (LogicalType::Datetime, DateTime(t)) => DateTime(t),
            (LogicalType::Datetime, Date(d)) => DateTime(d as i64 * MS_PER_DAY),
            (LogicalType::Datetime, Int(i)) => DateTime(i),
            (LogicalType::Datetime, Float(f)) if f.is_finite() => DateTime(f as i64),
            (LogicalType::Datetime, Str(s)) => parse_date(&s)
                .map(|d| DateTime(d as i64 * MS_PER_DAY))
                .unwrap_or(Null),
            (LogicalType::String, Str(s)) => Str(s),
            (LogicalType::String, v) => Str(v.to_string()),
            _ => Null,
        }
    }

    /// Convert a plain JSON value into a scalar of the declared type.
    pub fn from_json(value: &serde_json::Value, ty: LogicalType) -> Scalar {
        use serde_json::Value;
        let raw = match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
            },
            Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(other.to_string()),
        };
        raw.coerce(ty)
    }

    /// Plain JSON rendering (dates as `YYYY-MM-DD`, datetimes as epoch millis).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Str(s) => Value::String(s.clone()),
            Scalar::Date(d) => Value::String(format_date(*d)),
            Scalar::DateTime(t) => Value::from(*t),
        }
    }
}

fn kind_order(s: &Scalar) -> u8 {
    match s {
        Scalar::Null => 0,
        Scalar::Bool(_) => 1,
        Scalar::Int(_) | Scalar::Float(_) => 2,
        Scalar::Date(_) => 3,
        Scalar::DateTime(_) => 4,
        Scalar::Str(_) => 5,
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Date(d) => f.write_str(&format_date(*d)),
            Scalar::DateTime(t) => write!(f, "{t}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Build a `Row` from `name => value` pairs.
#[macro_export]
macro_rules! row {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut row = $crate::types::Row::new();
        $( row.insert(($name).to_string(), $crate::types::Scalar::from($value)); )*
        row
    }};
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Scalar::Float(_) => serializer.serialize_none(),
            Scalar::Str(s) => serializer.serialize_str(s),
            Scalar::Date(d) => serializer.serialize_str(&format_date(*d)),
            Scalar::DateTime(t) => serializer.serialize_i64(*t),
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a plain value: null, boolean, number or string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Scalar, D::Error> {
        Scalar::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
        Ok(Scalar::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
        Ok(Scalar::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
        Ok(i64::try_from(v)
            .map(Scalar::Int)
            .unwrap_or(Scalar::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
        Ok(Scalar::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
        Ok(Scalar::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
        Ok(Scalar::Str(v))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// 1970-01-01 counted in days from 0001-01-01 (day 1), as chrono numbers them.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Parse `YYYY-MM-DD` (optionally followed by a time part, which is ignored).
pub fn parse_date(s: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(s.trim().get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// `YYYY-MM-DD`, or the raw day count when it is outside chrono's range.
pub fn format_date(days: i32) -> String {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| days.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_roundtrip_through_text() {
        for s in ["1970-01-01", "2000-02-29", "1969-12-31", "2024-11-05"] {
            let days = parse_date(s).unwrap();
            assert_eq!(format_date(days), s);
        }
        assert_eq!(parse_date("1970-01-02"), Some(1));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2023-02-30"), None);
        assert_eq!(parse_date("2024-03-01T10:00:00"), parse_date("2024-03-01"));
    }

    #[test]
    fn wire_form_is_plain_json() {
        let row = crate::row! { "x" => 1, "y" => "a", "z" => Scalar::Null, "f" => 1.5 };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            serde_json::json!({"f": 1.5, "x": 1, "y": "a", "z": null})
        );
        assert_eq!(
            serde_json::to_value(Scalar::Date(1)).unwrap(),
            serde_json::json!("1970-01-02")
        );
        assert_eq!(
            serde_json::to_value(Scalar::Float(f64::NAN)).unwrap(),
            serde_json::Value::Null
        );

        let back: Row = serde_json::from_str(r#"{"x": 1, "y": "a", "b": true, "f": 2.5, "n": null}"#)
            .unwrap();
        assert_eq!(back["x"], Scalar::Int(1));
        assert_eq!(back["y"], Scalar::from("a"));
        assert_eq!(back["b"], Scalar::Bool(true));
        assert_eq!(back["f"], Scalar::Float(2.5));
        assert_eq!(back["n"], Scalar::Null);
    }

    #[test]
    fn nested_values_are_rejected() {
        assert!(serde_json::from_str::<Scalar>("[1]").is_err());
        assert!(serde_json::from_str::<Scalar>(r#"{"Int": 1}"#).is_err());
    }

    #[test]
    fn coercion_follows_declared_type() {
        assert_eq!(Scalar::Int(3).coerce(LogicalType::Float), Scalar::Float(3.0));
        assert_eq!(Scalar::from("42").coerce(LogicalType::Integer), Scalar::Int(42));
        assert_eq!(Scalar::Int(7).coerce(LogicalType::String), Scalar::from("7"));
        assert_eq!(Scalar::from("x").coerce(LogicalType::Integer), Scalar::Null);
        assert_eq!(
            Scalar::from("1970-01-03").coerce(LogicalType::Date),
            Scalar::Date(2)
        );
    }

    #[test]
    fn total_order_mixes_ints_and_floats() {
        assert_eq!(Scalar::Int(1).total_cmp(&Scalar::Float(1.5)), Ordering::Less);
        assert_eq!(Scalar::Null.total_cmp(&Scalar::Int(-5)), Ordering::Less);
        assert_eq!(Scalar::from("b").total_cmp(&Scalar::from("a")), Ordering::Greater);
    }

    #[test]
    fn row_macro_builds_objects() {
        let r = crate::row! { "x" => 1, "y" => "a" };
        assert_eq!(r.get("x"), Some(&Scalar::Int(1)));
        assert_eq!(r.get("y"), Some(&Scalar::from("a")));
    }

    #[test]
    fn from_json_uses_declared_type() {
        let v = serde_json::json!(2);
        assert_eq!(Scalar::from_json(&v, LogicalType::Float), Scalar::Float(2.0));
        assert_eq!(Scalar::from_json(&serde_json::Value::Null, LogicalType::Integer), Scalar::Null);
    }
}
