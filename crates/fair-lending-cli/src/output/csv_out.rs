use serde_json::Value;
use std::io;

use super::{cell_text, primary_rows};

/// Write output as CSV to stdout.
///
/// Row sets become one CSV table with a header from the first row; any
/// other result becomes two columns, `field` and `value`.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let written = match primary_rows(value) {
        Some(rows) => write_rows(&mut wtr, rows),
        None => write_fields(&mut wtr, value.get("result").unwrap_or(value)),
    };
    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        tracing::error!(error = %e, "failed to write CSV output");
    }
}

fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> Result<(), csv::Error> {
    let Some(Value::Object(first)) = rows.first() else {
        for row in rows {
            wtr.write_record([cell_text(row)])?;
        }
        return Ok(());
    };

    let headers: Vec<&String> = first.keys().collect();
    wtr.write_record(&headers)?;
    for row in rows {
        if let Value::Object(map) = row {
            wtr.write_record(headers.iter().map(|h| map.get(*h).map(cell_text).unwrap_or_default()))?;
        }
    }
    Ok(())
}

fn write_fields<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> Result<(), csv::Error> {
    match value {
        Value::Object(map) => {
            wtr.write_record(["field", "value"])?;
            for (key, val) in map {
                wtr.write_record([key.clone(), cell_text(val)])?;
            }
        }
        other => wtr.write_record([cell_text(other)])?,
    }
    Ok(())
}
