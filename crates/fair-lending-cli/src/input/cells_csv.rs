//! CSV readers for the cell table and the entity side-table.
//!
//! The cell table has seven fixed columns; every other column is taken as a
//! metric numerator and handed to the core, which checks it against the
//! registry.

use fair_lending_core::metrics::registry::{MetricDefinition, MetricRegistry};
use fair_lending_core::table::CellRow;
use fair_lending_core::EntityMetadata;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;

use crate::input::file::resolve_path;

const FIXED_COLUMNS: [&str; 7] = [
    "entity_id",
    "year",
    "geography_id",
    "sub_geography_id",
    "loan_category",
    "kind",
    "total_count",
];

pub fn read_cells(path: &str) -> Result<Vec<CellRow>, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = File::open(&canonical)
        .map_err(|e| format!("Failed to open '{}': {}", canonical.display(), e))?;
    parse_cells(file).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
}

pub fn read_entities(path: &str) -> Result<Vec<EntityMetadata>, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = File::open(&canonical)
        .map_err(|e| format!("Failed to open '{}': {}", canonical.display(), e))?;
    parse_entities(file).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
}

pub fn parse_cells<R: Read>(reader: R) -> Result<Vec<CellRow>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut positions = BTreeMap::new();
    for name in FIXED_COLUMNS {
        let idx = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format!("missing required column '{name}'"))?;
        positions.insert(name, idx);
    }
    let metric_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !FIXED_COLUMNS.contains(h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = line + 2;
        let field = |name: &str| record.get(positions[name]).unwrap_or("");

        let mut numerators = BTreeMap::new();
        for (idx, metric) in &metric_columns {
            let raw = record.get(*idx).unwrap_or("");
            numerators.insert(metric.clone(), parse_count(raw, metric, line)?);
        }

        rows.push(CellRow {
            entity_id: field("entity_id").to_string(),
            year: field("year")
                .parse()
                .map_err(|_| format!("line {line}: invalid year '{}'", field("year")))?,
            geography_id: field("geography_id").to_string(),
            sub_geography_id: field("sub_geography_id").to_string(),
            loan_category: field("loan_category").to_string(),
            kind: field("kind").to_string(),
            total_count: parse_count(field("total_count"), "total_count", line)?,
            numerators,
        });
    }
    tracing::debug!(rows = rows.len(), metrics = metric_columns.len(), "cell csv parsed");
    Ok(rows)
}

pub fn parse_entities<R: Read>(reader: R) -> Result<Vec<EntityMetadata>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut entities = Vec::new();
    for record in rdr.deserialize() {
        let mut meta: EntityMetadata = record?;
        if matches!(meta.category_tag.as_deref(), Some("")) {
            meta.category_tag = None;
        }
        entities.push(meta);
    }
    Ok(entities)
}

/// Metric definitions for the numerator columns present in `rows`.
///
/// Used when a CSV table comes without `--metrics`. Ids from the standard
/// battery keep their standard label; any other column is labelled by its id.
pub fn metrics_from_rows(rows: &[CellRow]) -> Result<Vec<MetricDefinition>, Box<dyn std::error::Error>> {
    let ids: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.numerators.keys().map(String::as_str))
        .collect();
    if ids.is_empty() {
        return Err("cell table has no metric columns; add numerator columns or pass --metrics".into());
    }
    let standard = MetricRegistry::standard();
    Ok(ids
        .into_iter()
        .map(|id| match standard.index_of(id).and_then(|i| standard.get(i)) {
            Some(def) => def.clone(),
            None => MetricDefinition::new(id, id),
        })
        .collect())
}

/// Blank cells read as zero; negatives pass through for the core to reject.
fn parse_count(raw: &str, column: &str, line: usize) -> Result<i64, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>()
        .map_err(|_| format!("line {line}: column '{column}' has non-integer value '{raw}'"))
}
