//! Snapshot rendering for `pivotcast run`.

use clap::ValueEnum;
use comfy_table::{presets, Cell, ContentArrangement, Table};
use serde_json::{json, Value as JsonValue};

use pivotcast_core::flat::{FlatResult, UNIT_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON document per view.
    Json,
    /// Aligned text table per view.
    Table,
}

pub fn format_snapshot(view: &str, flat: &FlatResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(view, flat),
        OutputFormat::Table => format_table(view, flat),
    }
}

fn format_json(view: &str, flat: &FlatResult) -> String {
    let data: Vec<JsonValue> = flat
        .data
        .iter()
        .map(|row| JsonValue::Array(row.iter().map(|v| v.to_json()).collect()))
        .collect();
    let doc = json!({
        "view": view,
        "header": flat.header,
        "row_spans": flat.row_spans,
        "col_spans": flat.col_spans,
        "data": data,
    });
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string())
}

/// Row labels of every data row: the label of the innermost span covering it.
fn row_labels(flat: &FlatResult) -> Vec<String> {
    let mut labels = vec![String::new(); flat.data.len()];
    for level in &flat.row_spans {
        let mut row = 0;
        for span in level {
            for slot in labels.iter_mut().skip(row).take(span.run_length) {
                *slot = span.label.label();
            }
            row += span.run_length;
        }
    }
    labels
}

fn format_table(view: &str, flat: &FlatResult) -> String {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(presets::UTF8_FULL);

    let pivoted = !flat.row_spans.is_empty();
    let mut header: Vec<Cell> = Vec::new();
    if pivoted {
        header.push(Cell::new(""));
    }
    header.extend(
        flat.header
            .iter()
            .map(|h| Cell::new(h.replace(UNIT_SEPARATOR, " | "))),
    );
    table.set_header(header);

    let labels = if pivoted { row_labels(flat) } else { Vec::new() };
    for (i, row) in flat.data.iter().enumerate() {
        let mut cells: Vec<Cell> = Vec::with_capacity(row.len() + 1);
        if let Some(label) = labels.get(i) {
            cells.push(Cell::new(label));
        }
        cells.extend(row.iter().map(|v| Cell::new(v.label())));
        table.add_row(cells);
    }
    format!("{view}\n{table}")
}
