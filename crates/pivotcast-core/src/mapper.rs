//! TypeMapper: logical types and operator tokens <-> engine enumerations.
//!
//! Pure lookup tables. Unknown logical types fall back to the string dtype;
//! unknown operator tokens map to `None` and the caller decides what that means
//! (the context builder treats it as a configuration error).

use serde::{Deserialize, Serialize};

use crate::schema::LogicalType;

/// Engine storage dtype. Discriminants are the engine's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Dtype {
    None = 0,
    Int64 = 1,
    Int32 = 2,
    Int16 = 3,
    Int8 = 4,
    Uint64 = 5,
    Uint32 = 6,
    Uint16 = 7,
    Uint8 = 8,
    Float64 = 9,
    Float32 = 10,
    Bool = 11,
    Time = 12,
    Date = 13,
    Enum = 14,
    Oid = 15,
    Ptr = 16,
    F64Pair = 17,
    UserFixed = 18,
    Str = 19,
    UserVlen = 20,
    LastVlen = 21,
    Last = 22,
}

impl Dtype {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl LogicalType {
    pub fn storage_type(self) -> Dtype {
        match self {
            LogicalType::Integer => Dtype::Int64,
            LogicalType::Float => Dtype::Float64,
            LogicalType::Boolean => Dtype::Bool,
            LogicalType::Date => Dtype::Date,
            LogicalType::Datetime => Dtype::Time,
            LogicalType::String => Dtype::Str,
        }
    }
}

/// Storage dtype for a logical type token; anything unrecognized is a string column.
pub fn to_storage_type(token: &str) -> Dtype {
    LogicalType::parse(token)
        .map(LogicalType::storage_type)
        .unwrap_or(Dtype::Str)
}

/// Reverse lookup used when describing context columns. Dtypes with no logical
/// counterpart (pointers, enums, user types) yield `None`.
pub fn logical_type_of(dtype: Dtype) -> Option<LogicalType> {
    match dtype {
        Dtype::Int64
        | Dtype::Int32
        | Dtype::Int16
        | Dtype::Int8
        | Dtype::Uint64
        | Dtype::Uint32
        | Dtype::Uint16
        | Dtype::Uint8 => Some(LogicalType::Integer),
        Dtype::Float64 | Dtype::Float32 | Dtype::F64Pair => Some(LogicalType::Float),
        Dtype::Str => Some(LogicalType::String),
        Dtype::Bool => Some(LogicalType::Boolean),
        Dtype::Time => Some(LogicalType::Datetime),
        Dtype::Date => Some(LogicalType::Date),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    Ne,
    BeginsWith,
    EndsWith,
    Contains,
    Or,
    In,
    NotIn,
    And,
    IsNan,
    IsNotNan,
}

pub fn to_filter_operator(token: &str) -> Option<FilterOp> {
    let op = match token {
        "&" | "and" => FilterOp::And,
        "|" | "or" => FilterOp::Or,
        "<" => FilterOp::Lt,
        ">" => FilterOp::Gt,
        "==" => FilterOp::Eq,
        "contains" => FilterOp::Contains,
        "<=" => FilterOp::LtEq,
        ">=" => FilterOp::GtEq,
        "!=" => FilterOp::Ne,
        "begins with" => FilterOp::BeginsWith,
        "ends with" => FilterOp::EndsWith,
        "in" => FilterOp::In,
        "not in" => FilterOp::NotIn,
        "is nan" => FilterOp::IsNan,
        "is not nan" => FilterOp::IsNotNan,
        _ => return None,
    };
    Some(op)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    DistinctCount,
    Sum,
    Mul,
    Mean,
    Count,
    WeightedMean,
    Unique,
    Any,
    Median,
    Join,
    ScaledDiv,
    ScaledAdd,
    Dominant,
    First,
    Last,
    And,
    Or,
    LastValue,
    HighWaterMark,
    LowWaterMark,
    SumAbs,
    SumNotNull,
    MeanByCount,
    Identity,
    DistinctLeaf,
    PctSumParent,
    PctSumGrandTotal,
}

pub fn to_aggregate_operator(name: &str) -> Option<AggregateOp> {
    use AggregateOp::*;
    let op = match name {
        "distinct" => DistinctCount,
        "sum" => Sum,
        "mul" => Mul,
        "avg" | "mean" => Mean,
        "count" => Count,
        "weighted mean" => WeightedMean,
        "unique" => Unique,
        "any" => Any,
        "median" => Median,
        "join" => Join,
        "div" => ScaledDiv,
        "add" => ScaledAdd,
        "dominant" => Dominant,
        "first by index" => First,
        "last by index" => Last,
        "and" => And,
        "or" => Or,
        "last" => LastValue,
        "high" => HighWaterMark,
        "low" => LowWaterMark,
        "sum abs" => SumAbs,
        "sum not null" => SumNotNull,
        "mean by count" => MeanByCount,
        "identity" => Identity,
        "distinct leaf" => DistinctLeaf,
        "pct sum parent" => PctSumParent,
        "pct sum grand total" => PctSumGrandTotal,
        _ => return None,
    };
    Some(op)
}

impl AggregateOp {
    /// Number of dependent columns the operator takes.
    pub fn arity(self) -> usize {
        match self {
            AggregateOp::WeightedMean => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
    None,
    AscAbs,
    DescAbs,
}

const SORT_ORDERS: [(&str, SortOrder); 5] = [
    ("asc", SortOrder::Asc),
    ("desc", SortOrder::Desc),
    ("none", SortOrder::None),
    ("asc abs", SortOrder::AscAbs),
    ("desc abs", SortOrder::DescAbs),
];

/// Stable ordinal of a sort-order token.
pub fn sort_order_index(token: &str) -> Option<u8> {
    SORT_ORDERS
        .iter()
        .position(|(t, _)| *t == token)
        .map(|i| i as u8)
}

impl SortOrder {
    pub fn from_index(idx: u8) -> Option<SortOrder> {
        SORT_ORDERS.get(idx as usize).map(|(_, o)| *o)
    }

    pub fn index(self) -> u8 {
        SORT_ORDERS
            .iter()
            .position(|(_, o)| *o == self)
            .map(|i| i as u8)
            .unwrap_or(2)
    }
}
