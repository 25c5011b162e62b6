//! Weighted underperformance score.
//!
//! A (cell, metric) pair qualifies when its gap ratio meets the threshold.
//! Each qualifying pair adds `cell volume / normalizer * metric weight`.
//! Significance is tallied alongside but never gates eligibility.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AnalysisConfig;
use crate::metrics::registry::MetricRegistry;
use crate::selection::filter::{self, RecentWindow};
use crate::shares::calculator::CellComparison;
use crate::types::*;

/// Per-geography pair counts for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographyTally {
    /// Pairs with a defined gap.
    pub evaluated_pairs: u32,
    pub qualifying_pairs: u32,
}

/// One qualifying (cell, metric) pair and what it added to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingPair {
    pub key: CellKey,
    pub metric_id: String,
    pub gap_ratio: GapRatio,
    pub contribution: Decimal,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityScore {
    pub entity_id: EntityId,
    /// Sum of contributions over qualifying pairs.
    pub total: Decimal,
    pub evaluated_pairs: u32,
    pub qualifying_pairs: u32,
    /// Qualifying pairs whose gap is also statistically significant.
    pub significant_pairs: u32,
    /// Keyed by geography id; only geographies with at least one defined gap.
    pub geographies: BTreeMap<String, GeographyTally>,
    pub qualifying_years: BTreeSet<i32>,
    /// Flagged in at least the configured fraction of evaluated geographies.
    pub consistent: bool,
    /// Has a qualifying pair inside the recency window.
    pub non_improving: bool,
    pub pairs: Vec<QualifyingPair>,
}

impl EntityScore {
    /// Score for an entity with no usable comparisons.
    pub fn empty(entity_id: &str) -> Self {
        EntityScore {
            entity_id: entity_id.to_string(),
            total: Decimal::ZERO,
            evaluated_pairs: 0,
            qualifying_pairs: 0,
            significant_pairs: 0,
            geographies: BTreeMap::new(),
            qualifying_years: BTreeSet::new(),
            consistent: false,
            non_improving: false,
            pairs: Vec::new(),
        }
    }

    pub fn flagged_geographies(&self) -> usize {
        self.geographies
            .values()
            .filter(|t| t.qualifying_pairs > 0)
            .count()
    }
}

/// Score one subject from its cell comparisons.
pub fn score_entity(
    entity_id: &str,
    comparisons: &[CellComparison],
    registry: &MetricRegistry,
    config: &AnalysisConfig,
    recent: &RecentWindow,
) -> EntityScore {
    let mut score = EntityScore::empty(entity_id);
    let metric_weights: Vec<Decimal> = (0..registry.len())
        .map(|i| config.metric_weight(registry, i))
        .collect();

    for cell in comparisons {
        let cell_weight = Decimal::from(cell.subject_total) / config.volume_normalizer;

        for (i, metric) in cell.metrics.iter().enumerate() {
            if !metric.has_gap() {
                continue;
            }
            score.evaluated_pairs += 1;
            let tally = score
                .geographies
                .entry(cell.key.geography_id.clone())
                .or_default();
            tally.evaluated_pairs += 1;

            let ratio = match metric.gap_ratio {
                Some(r) if r.meets(config.gap_ratio_threshold) => r,
                _ => continue,
            };

            tally.qualifying_pairs += 1;
            let contribution = cell_weight * metric_weights[i];
            let significant = metric.significance.significant;
            score.total += contribution;
            score.qualifying_pairs += 1;
            if significant {
                score.significant_pairs += 1;
            }
            score.qualifying_years.insert(cell.key.year);
            score.pairs.push(QualifyingPair {
                key: cell.key.clone(),
                metric_id: metric.metric_id.clone(),
                gap_ratio: ratio,
                contribution,
                significant,
            });
        }
    }

    score.consistent = filter::is_consistent(&score, config.consistency_fraction);
    score.non_improving = filter::is_non_improving(&score, recent);

    tracing::debug!(
        entity = entity_id,
        total = %score.total,
        qualifying = score.qualifying_pairs,
        evaluated = score.evaluated_pairs,
        "entity scored"
    );
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignificanceMethod;
    use crate::shares::calculator::MetricComparison;
    use crate::significance::proportion_test::SignificanceOutcome;
    use rust_decimal_macros::dec;

    fn key(year: i32, geo: &str) -> CellKey {
        CellKey {
            year,
            geography_id: geo.into(),
            sub_geography_id: String::new(),
            loan_category: "purchase".into(),
            kind: "originations".into(),
        }
    }

    fn metric(id: &str, ratio: Option<GapRatio>, significant: bool) -> MetricComparison {
        MetricComparison {
            metric_id: id.into(),
            subject_count: 0,
            subject_total: 0,
            subject_share: Some(dec!(0.1)),
            peer_count: 0,
            peer_total: 0,
            peer_share: Some(dec!(0.3)),
            gap: Some(dec!(-20)),
            gap_ratio: ratio,
            skip: None,
            significance: SignificanceOutcome {
                method: SignificanceMethod::ChiSquared,
                statistic: None,
                p_value: None,
                significant,
                skip: None,
            },
        }
    }

    fn cell(year: i32, geo: &str, total: Count, metrics: Vec<MetricComparison>) -> CellComparison {
        CellComparison {
            subject_id: "S".into(),
            key: key(year, geo),
            subject_total: total,
            peer_ids: vec!["P".into()],
            peer_total: total,
            skip: None,
            metrics,
        }
    }

    fn registry() -> MetricRegistry {
        use crate::metrics::registry::MetricDefinition;
        MetricRegistry::new(vec![
            MetricDefinition::new("mmct", "MMCT"),
            MetricDefinition::new("lmict", "LMICT"),
        ])
        .unwrap()
    }

    fn recent() -> RecentWindow {
        RecentWindow::new([2022, 2023])
    }

    #[test]
    fn test_contribution_weighted_by_volume() {
        let cells = vec![cell(
            2023,
            "G1",
            500_000,
            vec![
                metric("mmct", Some(GapRatio::Finite(dec!(3))), true),
                metric("lmict", Some(GapRatio::Finite(dec!(1.5))), false),
            ],
        )];
        let s = score_entity("S", &cells, &registry(), &AnalysisConfig::default(), &recent());
        assert_eq!(s.total, dec!(0.5));
        assert_eq!(s.qualifying_pairs, 1);
        assert_eq!(s.evaluated_pairs, 2);
        assert_eq!(s.significant_pairs, 1);
        assert_eq!(s.pairs[0].metric_id, "mmct");
    }

    #[test]
    fn test_unbounded_ratio_qualifies() {
        let cells = vec![cell(2023, "G1", 1_000_000, vec![
            metric("mmct", Some(GapRatio::Unbounded), false),
            metric("lmict", None, false),
        ])];
        let s = score_entity("S", &cells, &registry(), &AnalysisConfig::default(), &recent());
        assert_eq!(s.total, Decimal::ONE);
        assert_eq!(s.qualifying_pairs, 1);
    }

    #[test]
    fn test_significance_does_not_gate_score() {
        let cells = vec![cell(2023, "G1", 1_000_000, vec![
            metric("mmct", Some(GapRatio::Finite(dec!(2))), false),
            metric("lmict", Some(GapRatio::Finite(dec!(2))), false),
        ])];
        let s = score_entity("S", &cells, &registry(), &AnalysisConfig::default(), &recent());
        assert_eq!(s.qualifying_pairs, 2);
        assert_eq!(s.significant_pairs, 0);
    }

    #[test]
    fn test_metric_weight_override() {
        let mut cfg = AnalysisConfig::default();
        cfg.metric_weights.insert("lmict".into(), dec!(3));
        let cells = vec![cell(2023, "G1", 1_000_000, vec![
            metric("mmct", Some(GapRatio::Finite(dec!(2))), false),
            metric("lmict", Some(GapRatio::Finite(dec!(2))), false),
        ])];
        let s = score_entity("S", &cells, &registry(), &cfg, &recent());
        assert_eq!(s.total, dec!(4));
    }

    #[test]
    fn test_undefined_gaps_ignored() {
        let mut m = metric("mmct", None, false);
        m.gap = None;
        m.peer_share = None;
        let cells = vec![cell(2023, "G1", 1_000_000, vec![m, metric("lmict", None, false)])];
        let s = score_entity("S", &cells, &registry(), &AnalysisConfig::default(), &recent());
        assert_eq!(s.evaluated_pairs, 1);
        assert_eq!(s.total, Decimal::ZERO);
        assert!(!s.consistent);
    }

    #[test]
    fn test_higher_threshold_never_raises_score() {
        let cells = vec![
            cell(2022, "G1", 200_000, vec![
                metric("mmct", Some(GapRatio::Finite(dec!(2.5))), false),
                metric("lmict", Some(GapRatio::Finite(dec!(4))), false),
            ]),
            cell(2023, "G2", 300_000, vec![
                metric("mmct", Some(GapRatio::Unbounded), false),
                metric("lmict", Some(GapRatio::Finite(dec!(2))), false),
            ]),
        ];
        let mut previous = None;
        for threshold in [dec!(1), dec!(2), dec!(2.5), dec!(3), dec!(10)] {
            let cfg = AnalysisConfig {
                gap_ratio_threshold: threshold,
                ..Default::default()
            };
            let s = score_entity("S", &cells, &registry(), &cfg, &recent());
            if let Some(prev) = previous {
                assert!(s.total <= prev, "threshold {threshold} raised score");
            }
            previous = Some(s.total);
        }
    }
}
