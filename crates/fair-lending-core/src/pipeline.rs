//! End-to-end analysis run.
//!
//! Stages, in order:
//! 1. **Validation** -- config against registry, rows into a [`CellTable`].
//! 2. **Volume index** -- built once, then shared read-only.
//! 3. **Per-subject comparison and scoring** -- independent per entity; runs
//!    on the rayon pool with the `parallel` feature.
//! 4. **Selection** -- gates, ranking, forced overrides, truncation.
//! 5. **Assembly** -- ranked list, per-entity tables, run summary.
//!
//! The whole run is a pure function of [`AnalysisInput`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::AnalysisConfig;
use crate::metrics::registry::{MetricDefinition, MetricRegistry};
use crate::peers::volume_index::VolumeIndex;
use crate::report::assembler::{self, EntityReport, RunSummary};
use crate::scoring::engine::{score_entity, EntityScore};
use crate::selection::filter::{self, RecentWindow, SelectionResult};
use crate::shares::calculator::{compare_subject, CellComparison};
use crate::table::{CellRow, CellTable};
use crate::types::*;
use crate::FairLendingResult;

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisInput {
    /// Metric registry; the standard battery when omitted.
    #[serde(default)]
    pub metrics: Option<Vec<MetricDefinition>>,
    pub cells: Vec<CellRow>,
    #[serde(default)]
    pub entities: Vec<EntityMetadata>,
    #[serde(default)]
    pub config: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub selection: SelectionResult,
    /// One per selected entity, in rank order.
    pub reports: Vec<EntityReport>,
    /// Every scored entity, in entity id order.
    pub scores: Vec<EntityScore>,
    pub summary: RunSummary,
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Run the full peer comparison, scoring and selection pipeline.
pub fn run_analysis(input: &AnalysisInput) -> FairLendingResult<ComputationOutput<AnalysisOutput>> {
    let start = Instant::now();
    let config = &input.config;

    let registry = match &input.metrics {
        Some(metrics) => MetricRegistry::new(metrics.clone())?,
        None => MetricRegistry::standard(),
    };
    let mut warnings = config.validate(&registry)?;

    let (table, table_warnings) = CellTable::from_rows(registry, &input.cells)?;
    warnings.extend(table_warnings);
    let metadata = index_metadata(&input.entities, &mut warnings);

    let index = VolumeIndex::build(&table);
    let recent = RecentWindow::from_config(config, table.years());
    tracing::info!(
        entities = table.entities().len(),
        coordinates = index.len(),
        recent_years = ?recent.years(),
        "starting peer comparison"
    );

    let mut comparisons: BTreeMap<EntityId, Vec<CellComparison>> = BTreeMap::new();
    let mut scores: BTreeMap<EntityId, EntityScore> = BTreeMap::new();
    for (entity_id, cells, score) in evaluate_entities(&table, &index, config, &recent) {
        comparisons.insert(entity_id.clone(), cells);
        scores.insert(entity_id, score);
    }

    let (selection, selection_warnings) = filter::select(&scores, config);
    warnings.extend(selection_warnings);

    let reports = assembler::assemble(&selection, &comparisons, &metadata, table.registry(), config);
    let summary = assembler::summarize(&comparisons, &scores, &recent);
    tracing::info!(
        selected = selection.entries.len(),
        cells_without_peers = summary.cells_without_peers,
        undefined_gaps = summary.undefined_gaps,
        "analysis complete"
    );

    let output = AnalysisOutput {
        selection,
        reports,
        scores: scores.into_values().collect(),
        summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Volume-band peer comparison with pooled peer shares, 2x2 proportion test and weighted gap-ratio scoring",
        &serde_json::json!({
            "metrics": table.registry().iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "recent_years": recent.years(),
            "config": config,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type EntityEvaluation = (EntityId, Vec<CellComparison>, EntityScore);

fn evaluate_entity(
    entity_id: &str,
    table: &CellTable,
    index: &VolumeIndex,
    config: &AnalysisConfig,
    recent: &RecentWindow,
) -> EntityEvaluation {
    let cells = compare_subject(table, index, entity_id, config);
    let score = score_entity(entity_id, &cells, table.registry(), config, recent);
    (entity_id.to_string(), cells, score)
}

#[cfg(feature = "parallel")]
fn evaluate_entities(
    table: &CellTable,
    index: &VolumeIndex,
    config: &AnalysisConfig,
    recent: &RecentWindow,
) -> Vec<EntityEvaluation> {
    use rayon::prelude::*;

    let ids: Vec<&EntityId> = table.entities().iter().collect();
    ids.par_iter()
        .map(|id| evaluate_entity(id, table, index, config, recent))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_entities(
    table: &CellTable,
    index: &VolumeIndex,
    config: &AnalysisConfig,
    recent: &RecentWindow,
) -> Vec<EntityEvaluation> {
    table
        .entities()
        .iter()
        .map(|id| evaluate_entity(id, table, index, config, recent))
        .collect()
}

fn index_metadata(
    entities: &[EntityMetadata],
    warnings: &mut Vec<String>,
) -> BTreeMap<EntityId, EntityMetadata> {
    let mut map = BTreeMap::new();
    for meta in entities {
        if map.contains_key(&meta.entity_id) {
            warnings.push(format!(
                "Duplicate metadata for entity '{}'; keeping the first row.",
                meta.entity_id
            ));
            continue;
        }
        map.insert(meta.entity_id.clone(), meta.clone());
    }
    map
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
