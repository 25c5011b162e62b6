pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The row set a command produced, if it produced one.
///
/// Commands put row sets under `results`; the full analysis envelope keeps
/// its ranked list under `result.selection.entries`.
pub(crate) fn primary_rows(value: &Value) -> Option<&[Value]> {
    if let Some(Value::Array(rows)) = value.get("results") {
        return Some(rows);
    }
    match value.pointer("/result/selection/entries") {
        Some(Value::Array(rows)) => Some(rows),
        _ => None,
    }
}

/// Render a scalar for a table or CSV cell.
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) if items.iter().all(|v| !v.is_object()) => {
            items.iter().map(cell_text).collect::<Vec<_>>().join(", ")
        }
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
