use serde_json::Value;

use super::primary_rows;

/// Fields that answer each command, in priority order.
const PRIORITY_KEYS: [&str; 4] = ["significant", "peer_count", "p_value", "entity_id"];

/// Print just the key answer.
///
/// Ranked output prints one entity id per line; single results print the
/// first priority field present, else the first field.
pub fn print_minimal(value: &Value) {
    if let Some(rows) = primary_rows(value) {
        for row in rows {
            let id = row
                .get("entity_id")
                .or_else(|| row.get("id"))
                .or_else(|| row.get("metric_id"));
            match id {
                Some(v) => println!("{}", format_minimal(v)),
                None => println!("{}", format_minimal(row)),
            }
        }
        return;
    }

    let result = value.get("result").unwrap_or(value);
    if let Value::Object(map) = result {
        let hit = PRIORITY_KEYS
            .iter()
            .find_map(|k| map.get(*k).filter(|v| !v.is_null()));
        if let Some(val) = hit {
            println!("{}", format_minimal(val));
            return;
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{key}: {}", format_minimal(val));
            return;
        }
    }
    println!("{}", format_minimal(result));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
