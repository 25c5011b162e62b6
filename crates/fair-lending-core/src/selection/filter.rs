//! Candidate selection.
//!
//! Every scored entity walks the same state machine:
//!
//! ```text
//! Candidate -> Excluded                  (forced exclude)
//!           -> Rejected(Inconsistent)    (flagged in too few geographies)
//!           -> Rejected(Improving)       (nothing qualifying in the recent window)
//!           -> Passed -> Selected | Truncated
//! ```
//!
//! Forced includes skip the consistency and recency gates and can never be
//! truncated; if they outnumber `max_results` the limit grows to fit them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AnalysisConfig;
use crate::scoring::engine::EntityScore;
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Recency window
// ---------------------------------------------------------------------------

/// Years counted as "recent" for the non-improvement check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentWindow {
    years: BTreeSet<i32>,
}

impl RecentWindow {
    pub fn new(years: impl IntoIterator<Item = i32>) -> Self {
        RecentWindow {
            years: years.into_iter().collect(),
        }
    }

    /// The explicit `recent_years` if configured, else the
    /// `recent_year_count` latest years among `data_years`.
    pub fn from_config(config: &AnalysisConfig, data_years: &BTreeSet<i32>) -> Self {
        match &config.recent_years {
            Some(years) => RecentWindow::new(years.iter().copied()),
            None => RecentWindow::new(
                data_years
                    .iter()
                    .rev()
                    .take(config.recent_year_count)
                    .copied(),
            ),
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years.contains(&year)
    }

    pub fn years(&self) -> &BTreeSet<i32> {
        &self.years
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Flagged geographies / evaluated geographies >= `fraction`.
///
/// An entity with no evaluated geography is never consistent.
pub fn is_consistent(score: &EntityScore, fraction: Decimal) -> bool {
    let evaluated = score.geographies.len();
    if evaluated == 0 {
        return false;
    }
    let flagged = Decimal::from(score.flagged_geographies() as u64);
    flagged / Decimal::from(evaluated as u64) >= fraction
}

/// At least one qualifying pair falls in the recent window.
pub fn is_non_improving(score: &EntityScore, recent: &RecentWindow) -> bool {
    score.qualifying_years.iter().any(|y| recent.contains(*y))
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Inconsistent,
    Improving,
}

/// Terminal state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CandidateState {
    Excluded,
    Rejected { reason: RejectionReason },
    Selected { rank: usize },
    /// Passed every gate but fell below the list cutoff.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDecision {
    pub entity_id: EntityId,
    pub forced_include: bool,
    #[serde(flatten)]
    pub state: CandidateState,
}

/// One row of the final ranked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEntity {
    pub rank: usize,
    pub entity_id: EntityId,
    pub score: Decimal,
    pub qualifying_pairs: u32,
    pub significant_pairs: u32,
    pub consistent: bool,
    pub non_improving: bool,
    pub forced_include: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Effective list size after making room for forced includes.
    pub limit: usize,
    pub entries: Vec<SelectedEntity>,
    /// One per candidate, in entity id order.
    pub decisions: Vec<EntityDecision>,
}

impl SelectionResult {
    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.iter().any(|e| e.entity_id == entity_id)
    }
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Score descending, then entity id ascending.
pub fn rank_order(a: &EntityScore, b: &EntityScore) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

/// Apply exclusion, gating, ranking, forced includes and truncation.
///
/// Forced includes with no score (absent from the data) are listed with a
/// zero score and reported in the returned warnings.
pub fn select(
    scores: &BTreeMap<EntityId, EntityScore>,
    config: &AnalysisConfig,
) -> (SelectionResult, Vec<String>) {
    let mut warnings = Vec::new();

    let missing: Vec<EntityScore> = config
        .forced_include_ids
        .iter()
        .filter(|id| !scores.contains_key(*id))
        .map(|id| {
            warnings.push(format!(
                "Forced-include entity '{id}' has no cells in the input; listed with a zero score."
            ));
            EntityScore::empty(id)
        })
        .collect();

    let mut states: BTreeMap<&str, CandidateState> = BTreeMap::new();
    let mut forced: Vec<&EntityScore> = Vec::new();
    let mut passed: Vec<&EntityScore> = Vec::new();

    for score in scores.values().chain(missing.iter()) {
        let id = score.entity_id.as_str();
        if config.forced_exclude_ids.contains(id) {
            states.insert(id, CandidateState::Excluded);
        } else if config.forced_include_ids.contains(id) {
            forced.push(score);
        } else if !score.consistent {
            states.insert(
                id,
                CandidateState::Rejected {
                    reason: RejectionReason::Inconsistent,
                },
            );
        } else if !score.non_improving {
            states.insert(
                id,
                CandidateState::Rejected {
                    reason: RejectionReason::Improving,
                },
            );
        } else {
            passed.push(score);
        }
    }

    let limit = config.max_results.max(forced.len());
    passed.sort_by(|a, b| rank_order(a, b));
    let open_slots = limit - forced.len();

    let mut chosen = forced;
    for (i, score) in passed.into_iter().enumerate() {
        if i < open_slots {
            chosen.push(score);
        } else {
            states.insert(score.entity_id.as_str(), CandidateState::Truncated);
        }
    }
    chosen.sort_by(|a, b| rank_order(a, b));

    let entries: Vec<SelectedEntity> = chosen
        .iter()
        .enumerate()
        .map(|(i, score)| {
            let rank = i + 1;
            states.insert(score.entity_id.as_str(), CandidateState::Selected { rank });
            SelectedEntity {
                rank,
                entity_id: score.entity_id.clone(),
                score: score.total,
                qualifying_pairs: score.qualifying_pairs,
                significant_pairs: score.significant_pairs,
                consistent: score.consistent,
                non_improving: score.non_improving,
                forced_include: config.forced_include_ids.contains(&score.entity_id),
            }
        })
        .collect();

    let decisions = states
        .into_iter()
        .map(|(id, state)| EntityDecision {
            entity_id: id.to_string(),
            forced_include: config.forced_include_ids.contains(id),
            state,
        })
        .collect();

    tracing::info!(selected = entries.len(), limit, "selection complete");

    (
        SelectionResult {
            limit,
            entries,
            decisions,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::engine::GeographyTally;
    use rust_decimal_macros::dec;

    fn scored(id: &str, total: Decimal, consistent: bool, non_improving: bool) -> EntityScore {
        EntityScore {
            total,
            consistent,
            non_improving,
            qualifying_pairs: 1,
            ..EntityScore::empty(id)
        }
    }

    fn table(scores: Vec<EntityScore>) -> BTreeMap<EntityId, EntityScore> {
        scores
            .into_iter()
            .map(|s| (s.entity_id.clone(), s))
            .collect()
    }

    fn with_geographies(flags: &[bool]) -> EntityScore {
        let mut s = EntityScore::empty("E");
        for (i, flagged) in flags.iter().enumerate() {
            s.geographies.insert(
                format!("G{i}"),
                GeographyTally {
                    evaluated_pairs: 3,
                    qualifying_pairs: u32::from(*flagged),
                },
            );
        }
        s
    }

    #[test]
    fn test_consistency_three_of_four() {
        let s = with_geographies(&[true, true, true, false]);
        assert!(is_consistent(&s, dec!(0.5)));
    }

    #[test]
    fn test_consistency_one_of_four() {
        let s = with_geographies(&[true, false, false, false]);
        assert!(!is_consistent(&s, dec!(0.5)));
    }

    #[test]
    fn test_consistency_exact_half_passes() {
        let s = with_geographies(&[true, false]);
        assert!(is_consistent(&s, dec!(0.5)));
        assert!(!is_consistent(&EntityScore::empty("X"), Decimal::ZERO));
    }

    #[test]
    fn test_recent_window_defaults_to_latest_years() {
        let data: BTreeSet<i32> = [2019, 2020, 2021, 2022].into_iter().collect();
        let w = RecentWindow::from_config(&AnalysisConfig::default(), &data);
        assert_eq!(w.years().iter().copied().collect::<Vec<_>>(), vec![2021, 2022]);

        let cfg = AnalysisConfig {
            recent_years: Some([2019].into_iter().collect()),
            ..Default::default()
        };
        assert!(RecentWindow::from_config(&cfg, &data).contains(2019));
    }

    #[test]
    fn test_non_improving_requires_recent_qualifying_year() {
        let mut s = EntityScore::empty("E");
        s.qualifying_years.insert(2019);
        let w = RecentWindow::new([2021, 2022]);
        assert!(!is_non_improving(&s, &w));
        s.qualifying_years.insert(2022);
        assert!(is_non_improving(&s, &w));
    }

    #[test]
    fn test_ranks_by_score_then_id() {
        let scores = table(vec![
            scored("B", dec!(2), true, true),
            scored("A", dec!(2), true, true),
            scored("C", dec!(5), true, true),
        ]);
        let (result, _) = select(&scores, &AnalysisConfig::default());
        let ids: Vec<&str> = result.entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
        assert_eq!(result.entries[0].rank, 1);
    }

    #[test]
    fn test_gates_reject_with_reason() {
        let scores = table(vec![
            scored("INCONSISTENT", dec!(9), false, true),
            scored("IMPROVING", dec!(9), true, false),
            scored("OK", dec!(1), true, true),
        ]);
        let (result, _) = select(&scores, &AnalysisConfig::default());
        assert_eq!(result.entries.len(), 1);
        let state_of = |id: &str| {
            result
                .decisions
                .iter()
                .find(|d| d.entity_id == id)
                .map(|d| d.state)
        };
        assert_eq!(
            state_of("INCONSISTENT"),
            Some(CandidateState::Rejected {
                reason: RejectionReason::Inconsistent
            })
        );
        assert_eq!(
            state_of("IMPROVING"),
            Some(CandidateState::Rejected {
                reason: RejectionReason::Improving
            })
        );
    }

    #[test]
    fn test_forced_exclude_beats_score() {
        let scores = table(vec![scored("TOP", dec!(100), true, true), scored("LOW", dec!(1), true, true)]);
        let mut cfg = AnalysisConfig::default();
        cfg.forced_exclude_ids.insert("TOP".into());
        let (result, _) = select(&scores, &cfg);
        assert!(!result.contains("TOP"));
        assert!(result.contains("LOW"));
    }

    #[test]
    fn test_forced_include_survives_truncation_and_gates() {
        let scores = table(vec![
            scored("A", dec!(3), true, true),
            scored("B", dec!(2), true, true),
            scored("Z", Decimal::ZERO, false, false),
        ]);
        let mut cfg = AnalysisConfig {
            max_results: 2,
            ..Default::default()
        };
        cfg.forced_include_ids.insert("Z".into());
        let (result, _) = select(&scores, &cfg);
        let ids: Vec<&str> = result.entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "Z"]);
        assert!(result.entries[1].forced_include);
        assert!(result
            .decisions
            .iter()
            .any(|d| d.entity_id == "B" && d.state == CandidateState::Truncated));
    }

    #[test]
    fn test_forced_includes_relax_limit() {
        let scores = table(vec![scored("A", dec!(3), true, true)]);
        let mut cfg = AnalysisConfig {
            max_results: 1,
            ..Default::default()
        };
        cfg.forced_include_ids.insert("X".into());
        cfg.forced_include_ids.insert("Y".into());
        let (result, warnings) = select(&scores, &cfg);
        assert_eq!(result.limit, 2);
        let ids: Vec<&str> = result.entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["X", "Y"]);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_short_list_is_not_an_error() {
        let scores = table(vec![scored("A", dec!(1), true, true)]);
        let (result, warnings) = select(&scores, &AnalysisConfig::default());
        assert_eq!(result.entries.len(), 1);
        assert!(warnings.is_empty());
    }
}
