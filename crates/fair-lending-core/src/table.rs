//! Cell table ingestion.
//!
//! Turns loosely-typed rows from the extraction step into validated
//! [`LoanCell`]s. Integrity failures abort here, before any peer matching
//! or scoring, so a malformed table can never produce a ranking.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FairLendingError;
use crate::metrics::registry::MetricRegistry;
use crate::types::*;
use crate::FairLendingResult;

/// A cell row as delivered by the upstream extraction.
///
/// Counts are signed so that negative values can be reported as integrity
/// failures instead of parse failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRow {
    pub entity_id: EntityId,
    pub year: i32,
    pub geography_id: String,
    #[serde(default)]
    pub sub_geography_id: String,
    pub loan_category: String,
    pub kind: String,
    pub total_count: i64,
    /// Metric id -> numerator count.
    pub numerators: BTreeMap<String, i64>,
}

impl CellRow {
    pub fn key(&self) -> CellKey {
        CellKey {
            year: self.year,
            geography_id: self.geography_id.clone(),
            sub_geography_id: self.sub_geography_id.clone(),
            loan_category: self.loan_category.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Immutable, validated cell table.
#[derive(Debug, Clone)]
pub struct CellTable {
    registry: MetricRegistry,
    cells: Vec<LoanCell>,
    by_cell: BTreeMap<CellKey, BTreeMap<EntityId, usize>>,
    entities: BTreeSet<EntityId>,
    years: BTreeSet<i32>,
}

impl CellTable {
    /// Validate `rows` against `registry`.
    ///
    /// Returns the table plus warnings for numerator columns the registry
    /// does not name (those columns are ignored).
    pub fn from_rows(
        registry: MetricRegistry,
        rows: &[CellRow],
    ) -> FairLendingResult<(CellTable, Vec<String>)> {
        if rows.is_empty() {
            return Err(FairLendingError::InsufficientData(
                "Cell table must contain at least one row.".into(),
            ));
        }

        let mut cells = Vec::with_capacity(rows.len());
        let mut by_cell: BTreeMap<CellKey, BTreeMap<EntityId, usize>> = BTreeMap::new();
        let mut entities = BTreeSet::new();
        let mut years = BTreeSet::new();
        let mut unregistered: BTreeSet<&str> = BTreeSet::new();

        for (row_idx, row) in rows.iter().enumerate() {
            let cell = validate_row(&registry, row_idx, row)?;

            for id in row.numerators.keys() {
                if registry.index_of(id).is_none() {
                    unregistered.insert(id.as_str());
                }
            }

            let slot = by_cell.entry(cell.key.clone()).or_default();
            if slot.contains_key(&cell.entity_id) {
                return Err(FairLendingError::integrity(
                    row_idx,
                    format!(
                        "Duplicate cell coordinate for entity '{}' at {}.",
                        cell.entity_id, cell.key
                    ),
                ));
            }
            slot.insert(cell.entity_id.clone(), cells.len());
            entities.insert(cell.entity_id.clone());
            years.insert(cell.key.year);
            cells.push(cell);
        }

        let warnings = unregistered
            .into_iter()
            .map(|id| format!("Numerator column '{id}' is not a registered metric and was ignored."))
            .collect();

        tracing::info!(
            rows = cells.len(),
            entities = entities.len(),
            cells = by_cell.len(),
            "cell table validated"
        );

        Ok((
            CellTable {
                registry,
                cells,
                by_cell,
                entities,
                years,
            },
            warnings,
        ))
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn cells(&self) -> &[LoanCell] {
        &self.cells
    }

    /// All entity ids in ascending order.
    pub fn entities(&self) -> &BTreeSet<EntityId> {
        &self.entities
    }

    /// Distinct years present, ascending.
    pub fn years(&self) -> &BTreeSet<i32> {
        &self.years
    }

    /// The row for `entity_id` at `key`, if the entity is active there.
    pub fn cell(&self, entity_id: &str, key: &CellKey) -> Option<&LoanCell> {
        self.by_cell
            .get(key)
            .and_then(|m| m.get(entity_id))
            .map(|&i| &self.cells[i])
    }

    /// Cells in which `entity_id` is active, in key order.
    pub fn cells_for<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a LoanCell> + 'a {
        self.by_cell
            .values()
            .filter_map(move |m| m.get(entity_id))
            .map(|&i| &self.cells[i])
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_row(registry: &MetricRegistry, row_idx: usize, row: &CellRow) -> FairLendingResult<LoanCell> {
    if row.entity_id.trim().is_empty() {
        return Err(FairLendingError::integrity(row_idx, "Entity id is empty."));
    }
    if row.total_count < 0 {
        return Err(FairLendingError::integrity(
            row_idx,
            format!(
                "Entity '{}' has negative total count {}.",
                row.entity_id, row.total_count
            ),
        ));
    }
    let total = row.total_count as Count;

    let mut numerators = Vec::with_capacity(registry.len());
    for metric in registry.iter() {
        let raw = *row.numerators.get(&metric.id).ok_or_else(|| {
            FairLendingError::config(
                "metrics",
                format!(
                    "Metric '{}' is registered but row {} has no such numerator column.",
                    metric.id, row_idx
                ),
            )
        })?;
        if raw < 0 {
            return Err(FairLendingError::integrity(
                row_idx,
                format!(
                    "Entity '{}' has negative '{}' count {}.",
                    row.entity_id, metric.id, raw
                ),
            ));
        }
        let count = raw as Count;
        if count > total {
            return Err(FairLendingError::integrity(
                row_idx,
                format!(
                    "Entity '{}' has '{}' count {} above cell total {}.",
                    row.entity_id, metric.id, count, total
                ),
            ));
        }
        numerators.push(count);
    }

    Ok(LoanCell {
        entity_id: row.entity_id.clone(),
        key: row.key(),
        total,
        numerators,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
