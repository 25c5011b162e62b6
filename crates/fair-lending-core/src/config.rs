//! Run-time policy for one analysis.
//!
//! Every knob has a serde default so a config file only needs to name what
//! it changes. Nothing here is process-wide: two runs with different
//! configs never see each other's settings.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FairLendingError;
use crate::metrics::registry::MetricRegistry;
use crate::types::EntityId;
use crate::FairLendingResult;

/// Which two-sample proportion test backs the significance flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMethod {
    /// Pearson chi-squared on the 2x2 contingency table (1 dof).
    #[default]
    ChiSquared,
    /// Pooled-variance two-proportion z-test, two-sided.
    TwoProportionZ,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Lower bound of the peer volume band, as a multiple of subject volume.
    #[serde(default = "default_volume_ratio_low")]
    pub volume_ratio_low: Decimal,
    /// Upper bound of the peer volume band.
    #[serde(default = "default_volume_ratio_high")]
    pub volume_ratio_high: Decimal,
    /// Peer share / subject share at or above which a pair counts against the subject.
    #[serde(default = "default_gap_ratio_threshold")]
    pub gap_ratio_threshold: Decimal,
    /// Minimum fraction of evaluated geographies that must contain a qualifying pair.
    #[serde(default = "default_consistency_fraction")]
    pub consistency_fraction: Decimal,
    /// Number of most recent distinct years forming the recency window.
    #[serde(default = "default_recent_year_count")]
    pub recent_year_count: usize,
    /// Explicit recency window; overrides `recent_year_count` when set.
    #[serde(default)]
    pub recent_years: Option<BTreeSet<i32>>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub forced_include_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub forced_exclude_ids: BTreeSet<EntityId>,
    #[serde(default = "default_significance_alpha")]
    pub significance_alpha: f64,
    #[serde(default)]
    pub significance_method: SignificanceMethod,
    /// Yates' correction for the chi-squared test.
    #[serde(default = "default_true")]
    pub continuity_correction: bool,
    /// Divisor turning a cell's application count into its score weight.
    #[serde(default = "default_volume_normalizer")]
    pub volume_normalizer: Decimal,
    /// Per-metric weight overrides; unlisted metrics weigh 1.
    #[serde(default)]
    pub metric_weights: BTreeMap<String, Decimal>,
}

fn default_volume_ratio_low() -> Decimal {
    dec!(0.5)
}

fn default_volume_ratio_high() -> Decimal {
    dec!(2.0)
}

fn default_gap_ratio_threshold() -> Decimal {
    dec!(2.0)
}

fn default_consistency_fraction() -> Decimal {
    dec!(0.5)
}

fn default_recent_year_count() -> usize {
    2
}

fn default_max_results() -> usize {
    15
}

fn default_significance_alpha() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_volume_normalizer() -> Decimal {
    dec!(1_000_000)
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            volume_ratio_low: default_volume_ratio_low(),
            volume_ratio_high: default_volume_ratio_high(),
            gap_ratio_threshold: default_gap_ratio_threshold(),
            consistency_fraction: default_consistency_fraction(),
            recent_year_count: default_recent_year_count(),
            recent_years: None,
            max_results: default_max_results(),
            forced_include_ids: BTreeSet::new(),
            forced_exclude_ids: BTreeSet::new(),
            significance_alpha: default_significance_alpha(),
            significance_method: SignificanceMethod::default(),
            continuity_correction: true,
            volume_normalizer: default_volume_normalizer(),
            metric_weights: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Check the config against itself and the metric registry.
    ///
    /// Returns non-fatal warnings; anything that would make the ranking
    /// meaningless is an error.
    pub fn validate(&self, registry: &MetricRegistry) -> FairLendingResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.volume_ratio_low < Decimal::ZERO {
            return Err(FairLendingError::config(
                "volume_ratio_low",
                "Lower volume ratio must be non-negative.",
            ));
        }
        if self.volume_ratio_high <= Decimal::ZERO || self.volume_ratio_high < self.volume_ratio_low
        {
            return Err(FairLendingError::config(
                "volume_ratio_high",
                format!(
                    "Upper volume ratio {} must be positive and >= lower ratio {}.",
                    self.volume_ratio_high, self.volume_ratio_low
                ),
            ));
        }
        if self.gap_ratio_threshold <= Decimal::ZERO {
            return Err(FairLendingError::config(
                "gap_ratio_threshold",
                "Gap ratio threshold must be positive.",
            ));
        }
        if self.consistency_fraction < Decimal::ZERO || self.consistency_fraction > Decimal::ONE {
            return Err(FairLendingError::config(
                "consistency_fraction",
                "Consistency fraction must lie in [0, 1].",
            ));
        }
        if !(self.significance_alpha > 0.0 && self.significance_alpha < 1.0) {
            return Err(FairLendingError::config(
                "significance_alpha",
                format!("Alpha {} must lie strictly between 0 and 1.", self.significance_alpha),
            ));
        }
        if self.volume_normalizer <= Decimal::ZERO {
            return Err(FairLendingError::config(
                "volume_normalizer",
                "Volume normalizer must be positive.",
            ));
        }
        if self.recent_years.is_none() && self.recent_year_count == 0 {
            return Err(FairLendingError::config(
                "recent_year_count",
                "Recency window must span at least one year.",
            ));
        }
        if matches!(&self.recent_years, Some(years) if years.is_empty()) {
            return Err(FairLendingError::config(
                "recent_years",
                "Explicit recency window must not be empty.",
            ));
        }

        if let Some(id) = self
            .forced_include_ids
            .intersection(&self.forced_exclude_ids)
            .next()
        {
            return Err(FairLendingError::config(
                "forced_include_ids",
                format!("Entity '{id}' is both force-included and force-excluded."),
            ));
        }

        for (metric, weight) in &self.metric_weights {
            registry.require(metric)?;
            if *weight < Decimal::ZERO {
                return Err(FairLendingError::config(
                    "metric_weights",
                    format!("Weight for metric '{metric}' must be non-negative."),
                ));
            }
        }

        if self.forced_include_ids.len() > self.max_results {
            warnings.push(format!(
                "max_results ({}) is smaller than the forced-include set ({}); \
                 the list will be extended to hold every forced include.",
                self.max_results,
                self.forced_include_ids.len()
            ));
        }

        Ok(warnings)
    }

    /// Weight for the metric at `index` in `registry`.
    pub fn metric_weight(&self, registry: &MetricRegistry, index: usize) -> Decimal {
        registry
            .get(index)
            .and_then(|m| self.metric_weights.get(&m.id))
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}
