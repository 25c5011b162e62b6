use colored::Colorize;
use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{cell_text, primary_rows};

/// Format output as tables using the tabled crate.
///
/// Row sets print as one table; the full analysis envelope prints its
/// ranked list and run summary. Warnings and methodology follow.
pub fn print_table(value: &Value) {
    let Value::Object(envelope) = value else {
        println!("{value}");
        return;
    };

    match primary_rows(value) {
        Some(rows) => {
            print_rows(rows);
            if let Some(summary) = value.pointer("/result/summary") {
                println!("\nSummary:");
                print_fields(summary);
            }
        }
        None => match envelope.get("result") {
            Some(result) => print_fields(result),
            None => print_fields(value),
        },
    }

    print_footer(envelope);
}

fn print_rows(rows: &[Value]) {
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }
    let Some(Value::Object(first)) = rows.first() else {
        for row in rows {
            println!("{}", cell_text(row));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(String::as_str));
    for row in rows {
        if let Value::Object(map) = row {
            builder.push_record(headers.iter().map(|h| map.get(h).map(cell_text).unwrap_or_default()));
        }
    }
    println!("{}", Table::from(builder));
}

fn print_fields(value: &Value) {
    let Value::Object(map) = value else {
        println!("{}", cell_text(value));
        return;
    };
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.clone(), cell_text(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}
