//! Shapes selection results into flat tables for rendering.
//!
//! No analysis happens here: every number is copied from the comparisons
//! and scores produced upstream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::metrics::registry::MetricRegistry;
use crate::scoring::engine::EntityScore;
use crate::selection::filter::{RecentWindow, SelectionResult};
use crate::shares::calculator::CellComparison;
use crate::types::*;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Gap ratio for one metric in one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRow {
    pub metric_id: String,
    pub metric_label: String,
    pub year: i32,
    pub geography_id: String,
    pub sub_geography_id: String,
    pub loan_category: String,
    pub kind: String,
    pub gap_ratio: Option<GapRatio>,
    pub qualifies: bool,
}

/// Subject and peer counts, shares and gap for one metric in one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareRow {
    pub metric_id: String,
    pub metric_label: String,
    pub year: i32,
    pub geography_id: String,
    pub sub_geography_id: String,
    pub loan_category: String,
    pub kind: String,
    pub subject_count: Count,
    pub subject_total: Count,
    pub subject_share: Option<Share>,
    pub peer_count: Count,
    pub peer_total: Count,
    pub peer_share: Option<Share>,
    pub gap: Option<PercentagePoints>,
    pub significant: bool,
    pub p_value: Option<f64>,
    pub skip: Option<SkipReason>,
}

/// Breakdown tables for one selected entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub rank: usize,
    pub entity_id: EntityId,
    pub display_name: String,
    pub category_tag: Option<String>,
    pub score: Decimal,
    pub ratio_table: Vec<RatioRow>,
    pub shares_table: Vec<ShareRow>,
}

/// Run-level counts, including every computation that was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entities: usize,
    pub recent_years: Vec<i32>,
    pub cells_compared: usize,
    pub cells_without_peers: usize,
    pub metric_pairs: usize,
    pub undefined_gaps: usize,
    pub untestable_pairs: usize,
    pub qualifying_pairs: usize,
    pub significant_pairs: usize,
    pub skips: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Build a report for every entry in `selection`, in rank order.
pub fn assemble(
    selection: &SelectionResult,
    comparisons: &BTreeMap<EntityId, Vec<CellComparison>>,
    metadata: &BTreeMap<EntityId, EntityMetadata>,
    registry: &MetricRegistry,
    config: &AnalysisConfig,
) -> Vec<EntityReport> {
    let no_cells: Vec<CellComparison> = Vec::new();
    selection
        .entries
        .iter()
        .map(|entry| {
            let cells = comparisons.get(&entry.entity_id).unwrap_or(&no_cells);
            let meta = metadata.get(&entry.entity_id);
            EntityReport {
                rank: entry.rank,
                entity_id: entry.entity_id.clone(),
                display_name: meta
                    .map(|m| m.display_name.clone())
                    .unwrap_or_else(|| entry.entity_id.clone()),
                category_tag: meta.and_then(|m| m.category_tag.clone()),
                score: entry.score,
                ratio_table: ratio_table(cells, registry, config),
                shares_table: shares_table(cells, registry),
            }
        })
        .collect()
}

/// Gap ratios by metric x cell.
pub fn ratio_table(
    cells: &[CellComparison],
    registry: &MetricRegistry,
    config: &AnalysisConfig,
) -> Vec<RatioRow> {
    let mut rows = Vec::new();
    for cell in cells {
        for (metric, def) in cell.metrics.iter().zip(registry.iter()) {
            rows.push(RatioRow {
                metric_id: def.id.clone(),
                metric_label: def.label.clone(),
                year: cell.key.year,
                geography_id: cell.key.geography_id.clone(),
                sub_geography_id: cell.key.sub_geography_id.clone(),
                loan_category: cell.key.loan_category.clone(),
                kind: cell.key.kind.clone(),
                gap_ratio: metric.gap_ratio,
                qualifies: metric
                    .gap_ratio
                    .map(|r| r.meets(config.gap_ratio_threshold))
                    .unwrap_or(false),
            });
        }
    }
    rows.sort_by(|a, b| {
        (&a.metric_id, a.year, &a.geography_id).cmp(&(&b.metric_id, b.year, &b.geography_id))
    });
    rows
}

/// Counts, shares, gap and significance by metric x cell.
pub fn shares_table(cells: &[CellComparison], registry: &MetricRegistry) -> Vec<ShareRow> {
    let mut rows = Vec::new();
    for cell in cells {
        for (metric, def) in cell.metrics.iter().zip(registry.iter()) {
            rows.push(ShareRow {
                metric_id: def.id.clone(),
                metric_label: def.label.clone(),
                year: cell.key.year,
                geography_id: cell.key.geography_id.clone(),
                sub_geography_id: cell.key.sub_geography_id.clone(),
                loan_category: cell.key.loan_category.clone(),
                kind: cell.key.kind.clone(),
                subject_count: metric.subject_count,
                subject_total: metric.subject_total,
                subject_share: metric.subject_share,
                peer_count: metric.peer_count,
                peer_total: metric.peer_total,
                peer_share: metric.peer_share,
                gap: metric.gap,
                significant: metric.significance.significant,
                p_value: metric.significance.p_value,
                skip: metric.skip.or(metric.significance.skip),
            });
        }
    }
    rows.sort_by(|a, b| {
        (&a.metric_id, a.year, &a.geography_id).cmp(&(&b.metric_id, b.year, &b.geography_id))
    });
    rows
}

/// Count comparisons and skips across the whole run.
pub fn summarize(
    comparisons: &BTreeMap<EntityId, Vec<CellComparison>>,
    scores: &BTreeMap<EntityId, EntityScore>,
    recent: &RecentWindow,
) -> RunSummary {
    let mut summary = RunSummary {
        entities: scores.len(),
        recent_years: recent.years().iter().copied().collect(),
        ..Default::default()
    };

    for cell in comparisons.values().flatten() {
        summary.cells_compared += 1;
        if !cell.has_peers() {
            summary.cells_without_peers += 1;
        }
        for metric in &cell.metrics {
            summary.metric_pairs += 1;
            if metric.gap.is_none() {
                summary.undefined_gaps += 1;
            }
            if metric.significance.skip.is_some() {
                summary.untestable_pairs += 1;
            }
            for reason in [metric.skip, metric.significance.skip].into_iter().flatten() {
                *summary.skips.entry(skip_label(reason).to_string()).or_default() += 1;
            }
        }
    }
    for score in scores.values() {
        summary.qualifying_pairs += score.qualifying_pairs as usize;
        summary.significant_pairs += score.significant_pairs as usize;
    }
    summary
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NoPeers => "no_peers",
        SkipReason::ZeroDenominator => "zero_denominator",
        SkipReason::DegenerateTable => "degenerate_table",
        SkipReason::UndefinedRatio => "undefined_ratio",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
