//! Lower a `ViewConfig` into an engine context.
//!
//! Every token is resolved here, before the engine sees anything: unknown
//! operators, unknown columns and aggregate arity mismatches are all
//! `Error::Config` and never reach `register_context`.

use serde_json::Value;
use tracing::debug;

use pivotcast_core::error::{Error, Result};
use pivotcast_core::id::{ContextId, GnodeId};
use pivotcast_core::mapper::{
    sort_order_index, to_aggregate_operator, to_filter_operator, AggregateOp, FilterOp,
};
use pivotcast_core::schema::LogicalType;
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::{Sidedness, ViewConfig};
use pivotcast_engine::{
    AggregateSpec, ContextDescriptor, EngineCore, FilterOperand, FilterSpec, Header, SortSpec,
    TableSchema,
};

/// A registered context and how many sides it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltContext {
    pub id: ContextId,
    pub sidedness: Sidedness,
}

fn column_type(schema: &TableSchema, column: &str, what: &str) -> Result<LogicalType> {
    let logical = schema.logical();
    logical
        .get(column)
        .ok_or_else(|| Error::Config(format!("{what} column '{column}' is not in the table")))
}

fn filters(config: &ViewConfig, schema: &TableSchema) -> Result<Vec<FilterSpec>> {
    let Some(filter) = &config.filter else {
        return Ok(Vec::new());
    };
    filter
        .iter()
        .map(|(column, token, operand)| {
            let op = to_filter_operator(token)
                .ok_or_else(|| Error::Config(format!("unknown filter operator '{token}'")))?;
            if matches!(op, FilterOp::And | FilterOp::Or) {
                return Err(Error::Config(format!(
                    "'{token}' combines filters and cannot filter column '{column}'"
                )));
            }
            let ty = column_type(schema, column, "filter")?;
            let operand = match operand {
                Value::Null => FilterOperand::None,
                Value::Array(items) => {
                    FilterOperand::List(items.iter().map(|v| Scalar::from_json(v, ty)).collect())
                }
                v => FilterOperand::Scalar(Scalar::from_json(v, ty)),
            };
            Ok(FilterSpec {
                column: column.clone(),
                op,
                operand,
            })
        })
        .collect()
}

fn sort(config: &ViewConfig) -> Result<Vec<SortSpec>> {
    let Some(sort) = &config.sort else {
        return Ok(Vec::new());
    };
    sort.iter()
        .map(|(column, token)| {
            let order = sort_order_index(token)
                .ok_or_else(|| Error::Config(format!("unknown sort order '{token}'")))?;
            Ok(SortSpec {
                column: *column,
                order,
            })
        })
        .collect()
}

fn aggregates(config: &ViewConfig, schema: &TableSchema) -> Result<Vec<AggregateSpec>> {
    let Some(aggregate) = &config.aggregate else {
        return Ok(schema
            .names
            .iter()
            .map(|c| AggregateSpec {
                name: c.clone(),
                op: AggregateOp::Any,
                columns: vec![c.clone()],
            })
            .collect());
    };
    aggregate
        .iter()
        .map(|agg| {
            let op = to_aggregate_operator(&agg.op)
                .ok_or_else(|| Error::Config(format!("unknown aggregate '{}'", agg.op)))?;
            let columns = agg.column.names();
            if columns.len() != op.arity() {
                return Err(Error::Config(format!(
                    "'{}' has incorrect arity ('{}') for column dependencies",
                    agg.op,
                    columns.len()
                )));
            }
            for c in &columns {
                column_type(schema, c, "aggregate")?;
            }
            Ok(AggregateSpec {
                name: agg.display_name(),
                op,
                columns,
            })
        })
        .collect()
}

/// Validate `config` against `schema` and produce the engine descriptor.
pub fn context_descriptor(config: &ViewConfig, schema: &TableSchema) -> Result<ContextDescriptor> {
    for c in config.row_pivots() {
        column_type(schema, c, "row pivot")?;
    }
    for c in config.column_pivots() {
        column_type(schema, c, "column pivot")?;
    }
    let filter_op = FilterOp::And;
    let filters = filters(config, schema)?;
    let sort = sort(config)?;
    let aggregates = aggregates(config, schema)?;

    Ok(match config.sidedness() {
        Sidedness::Two => ContextDescriptor::Two {
            row_pivots: config.row_pivots().to_vec(),
            column_pivots: config.column_pivots().to_vec(),
            filter_op,
            filters,
            aggregates,
            sort,
        },
        Sidedness::One => ContextDescriptor::One {
            row_pivots: config.row_pivots().to_vec(),
            filter_op,
            filters,
            aggregates,
            sort,
        },
        // Only the dependent column of each aggregate is forwarded.
        Sidedness::Zero => ContextDescriptor::Zero {
            filter_op,
            filters,
            columns: aggregates
                .into_iter()
                .filter_map(|a| a.columns.into_iter().next())
                .collect(),
            sort,
        },
    })
}

/// Build and register a context for `config` on `gnode`, then expand each
/// pivoted axis to its full pivot depth.
pub fn build_context<E: EngineCore + ?Sized>(
    engine: &mut E,
    gnode: GnodeId,
    name: &str,
    config: &ViewConfig,
) -> Result<BuiltContext> {
    let schema = engine.table_schema(gnode)?;
    let descriptor = context_descriptor(config, &schema)?;
    let sidedness = descriptor.sidedness();
    let id = engine.register_context(gnode, name, descriptor)?;

    match sidedness {
        Sidedness::Two => {
            engine.set_depth(id, Header::Row, config.row_pivots().len())?;
            engine.set_depth(id, Header::Column, config.column_pivots().len())?;
        }
        Sidedness::One => engine.set_depth(id, Header::Row, config.row_pivots().len())?,
        Sidedness::Zero => {}
    }
    debug!(context = %id, name, sides = sidedness.sides(), "built context");
    Ok(BuiltContext { id, sidedness })
}
