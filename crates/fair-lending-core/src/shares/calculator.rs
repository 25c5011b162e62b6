//! Subject vs pooled-peer shares, gaps and gap ratios.
//!
//! Peer counts are pooled (numerators summed, denominators summed) rather
//! than averaging per-peer shares; the significance test needs the raw
//! pooled counts.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::peers::matcher::{match_peers, PeerBounds, PeerSet};
use crate::peers::volume_index::VolumeIndex;
use crate::significance::proportion_test::{self, Proportion, SignificanceOutcome};
use crate::table::CellTable;
use crate::types::*;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Subject vs peer comparison for one metric in one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric_id: String,
    pub subject_count: Count,
    pub subject_total: Count,
    /// `None` when `subject_total` is 0.
    pub subject_share: Option<Share>,
    pub peer_count: Count,
    pub peer_total: Count,
    /// `None` when there are no peers or `peer_total` is 0.
    pub peer_share: Option<Share>,
    /// Subject minus peer share in percentage points; defined iff both shares are.
    pub gap: Option<PercentagePoints>,
    pub gap_ratio: Option<GapRatio>,
    /// Why `gap` or `gap_ratio` is missing.
    pub skip: Option<SkipReason>,
    pub significance: SignificanceOutcome,
}

impl MetricComparison {
    pub fn has_gap(&self) -> bool {
        self.gap.is_some()
    }
}

/// All metric comparisons for one subject in one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellComparison {
    pub subject_id: EntityId,
    pub key: CellKey,
    pub subject_total: Count,
    pub peer_ids: Vec<EntityId>,
    /// Pooled peer volume; 0 means the subject had no peers in this cell.
    pub peer_total: Count,
    /// `Some(NoPeers)` when the cell can't be compared at all.
    pub skip: Option<SkipReason>,
    /// Aligned with the registry order.
    pub metrics: Vec<MetricComparison>,
}

impl CellComparison {
    pub fn has_peers(&self) -> bool {
        self.skip != Some(SkipReason::NoPeers)
    }
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Share of `numerator` in `denominator`, `None` for an empty denominator.
pub fn share(numerator: Count, denominator: Count) -> Option<Share> {
    if denominator == 0 {
        None
    } else {
        Some(Decimal::from(numerator) / Decimal::from(denominator))
    }
}

/// Peer share over subject share.
///
/// `Unbounded` when the subject has none of a category the peers do lend
/// in; `None` when neither lends in it.
pub fn gap_ratio(subject_share: Share, peer_share: Share) -> Option<GapRatio> {
    if subject_share > Decimal::ZERO {
        Some(GapRatio::Finite(peer_share / subject_share))
    } else if peer_share > Decimal::ZERO {
        Some(GapRatio::Unbounded)
    } else {
        None
    }
}

/// Compare `subject_id` with its peers in every cell where it is active.
///
/// Cells come back in [`CellKey`] order. Cells with no peers are kept, with
/// `peer_total = 0` and every gap undefined.
pub fn compare_subject(
    table: &CellTable,
    index: &VolumeIndex,
    subject_id: &str,
    config: &AnalysisConfig,
) -> Vec<CellComparison> {
    let bounds = PeerBounds::from_config(config);
    table
        .cells_for(subject_id)
        .map(|cell| {
            let peers = match_peers(index, subject_id, &cell.key, bounds);
            compare_cell(table, cell, &peers, config)
        })
        .collect()
}

/// Compare one subject cell against a precomputed peer set.
pub fn compare_cell(
    table: &CellTable,
    subject: &LoanCell,
    peers: &PeerSet,
    config: &AnalysisConfig,
) -> CellComparison {
    let n_metrics = table.registry().len();
    let mut peer_numerators = vec![0 as Count; n_metrics];
    let mut peer_total: Count = 0;

    for (peer_id, _) in &peers.members {
        if let Some(peer_cell) = table.cell(peer_id, &subject.key) {
            peer_total += peer_cell.total;
            for (acc, n) in peer_numerators.iter_mut().zip(&peer_cell.numerators) {
                *acc += n;
            }
        }
    }

    let no_peers = peers.is_empty();
    if no_peers {
        tracing::debug!(subject = %subject.entity_id, cell = %subject.key, "no peers in volume band");
    }

    let metrics = table
        .registry()
        .iter()
        .enumerate()
        .map(|(i, metric)| {
            let subject_count = subject.numerators[i];
            let peer_count = peer_numerators[i];
            compare_metric(
                &metric.id,
                Proportion::new(subject_count, subject.total),
                if no_peers {
                    None
                } else {
                    Some(Proportion::new(peer_count, peer_total))
                },
                config,
            )
        })
        .collect();

    CellComparison {
        subject_id: subject.entity_id.clone(),
        key: subject.key.clone(),
        subject_total: subject.total,
        peer_ids: peers.members.iter().map(|(id, _)| id.clone()).collect(),
        peer_total,
        skip: no_peers.then_some(SkipReason::NoPeers),
        metrics,
    }
}

fn compare_metric(
    metric_id: &str,
    subject: Proportion,
    peer: Option<Proportion>,
    config: &AnalysisConfig,
) -> MetricComparison {
    let subject_share = share(subject.numerator, subject.denominator);
    let peer_counts = peer.unwrap_or(Proportion::new(0, 0));
    let peer_share = peer.and_then(|p| share(p.numerator, p.denominator));

    let (gap, gap_ratio, skip) = match (peer, subject_share, peer_share) {
        (None, _, _) => (None, None, Some(SkipReason::NoPeers)),
        (Some(_), Some(s), Some(p)) => {
            let ratio = gap_ratio(s, p);
            let skip = ratio.is_none().then_some(SkipReason::UndefinedRatio);
            (Some((s - p) * dec!(100)), ratio, skip)
        }
        (Some(_), _, _) => (None, None, Some(SkipReason::ZeroDenominator)),
    };

    let significance = match peer {
        Some(p) => proportion_test::assess(subject, p, config),
        None => SignificanceOutcome::skipped(config.significance_method, SkipReason::NoPeers),
    };

    MetricComparison {
        metric_id: metric_id.to_string(),
        subject_count: subject.numerator,
        subject_total: subject.denominator,
        subject_share,
        peer_count: peer_counts.numerator,
        peer_total: peer_counts.denominator,
        peer_share,
        gap,
        gap_ratio,
        skip,
        significance,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
