//! Flatten a live context into a `FlatResult`.
//!
//! Zero-sided contexts are read cell for cell. Sided contexts are read through
//! their leaf data: every row carries `row_depth` header cells before its
//! values, and two-sided leaf data starts with one extra row holding each leaf
//! column's joined path.

use pivotcast_core::error::Result;
use pivotcast_core::flat::FlatResult;
use pivotcast_core::id::ContextId;
use pivotcast_core::mapper::logical_type_of;
use pivotcast_core::schema::Schema;
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::Sidedness;
use pivotcast_engine::{EngineCore, Header};

use crate::spans::{ColSpanBuilder, RowSpanBuilder};

pub fn flat_snapshot<E: EngineCore + ?Sized>(engine: &E, ctx: ContextId) -> Result<FlatResult> {
    let sidedness = engine.sidedness(ctx)?;
    let dtype_offset = usize::from(sidedness != Sidedness::Zero);

    let header = engine.column_names(ctx)?;
    let mut schema = Schema::new();
    for (i, name) in header.iter().enumerate() {
        // Dtypes without a logical type stay out of the schema.
        if let Some(ty) = logical_type_of(engine.column_dtype(ctx, i + dtype_offset)?) {
            schema.insert(name.clone(), ty);
        }
    }

    let mut out = FlatResult {
        header,
        schema,
        ..FlatResult::default()
    };

    let (row_depth, column_depth) = match sidedness {
        Sidedness::Zero => {
            let end_row = engine.row_count(ctx)?;
            let end_col = engine.column_count(ctx)?;
            let slice = engine.get_data(ctx, 0, end_row, 0, end_col)?;
            out.data = (0..slice.rows)
                .map(|r| (0..slice.stride).map(|c| slice.get(r, c).clone()).collect())
                .collect();
            return Ok(out);
        }
        Sidedness::One => (engine.depth(ctx, Header::Row)? + 1, 0),
        Sidedness::Two => (
            engine.depth(ctx, Header::Row)? + 1,
            engine.depth(ctx, Header::Column)? + 1,
        ),
    };

    let end_row = engine.leaf_count(ctx, Header::Row)?;
    let end_col = engine.column_count(ctx)? + row_depth;
    let slice = engine.get_leaf_data(ctx, 0, end_row, 0, end_col)?;

    let mut first_row = 0;
    if column_depth > 0 {
        let mut cols = ColSpanBuilder::new(column_depth);
        for c in row_depth..slice.stride {
            cols.push_path(&slice.get(0, c).label());
        }
        out.col_spans = cols.finish();
        first_row = 1;
    }

    let mut rows = RowSpanBuilder::new(row_depth);
    for r in first_row..slice.rows {
        let header: Vec<Scalar> = (0..row_depth).map(|c| slice.get(r, c).clone()).collect();
        rows.push_row(&header);
        out.data
            .push((row_depth..slice.stride).map(|c| slice.get(r, c).clone()).collect());
    }
    out.row_spans = rows.finish();
    Ok(out)
}
