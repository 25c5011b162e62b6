//! Two-sample proportion tests on subject vs pooled-peer counts.
//!
//! Covers:
//! 1. **Pearson chi-squared** on the 2x2 table, 1 dof, optional Yates correction.
//! 2. **Two-proportion z-test** with pooled variance, two-sided.
//!
//! Both tests share one skip rule: a zero denominator or a zero expected
//! count means the test is not run and the flag stays false. Only subject
//! underperformance is ever flagged.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::config::{AnalysisConfig, SignificanceMethod};
use crate::types::{Count, SkipReason};

/// Numerator and denominator for one side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proportion {
    pub numerator: Count,
    pub denominator: Count,
}

impl Proportion {
    pub fn new(numerator: Count, denominator: Count) -> Self {
        Proportion {
            numerator,
            denominator,
        }
    }

    fn rate(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// Raw test statistic and p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestStatistic {
    pub statistic: f64,
    pub p_value: f64,
}

/// Significance verdict for one (subject, cell, metric).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceOutcome {
    pub method: SignificanceMethod,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    /// p < alpha and the subject underperforms.
    pub significant: bool,
    pub skip: Option<SkipReason>,
}

impl SignificanceOutcome {
    pub fn skipped(method: SignificanceMethod, reason: SkipReason) -> Self {
        SignificanceOutcome {
            method,
            statistic: None,
            p_value: None,
            significant: false,
            skip: Some(reason),
        }
    }
}

/// Run the configured test and apply the underperformance rule.
pub fn assess(subject: Proportion, peer: Proportion, config: &AnalysisConfig) -> SignificanceOutcome {
    let method = config.significance_method;
    let tested = match method {
        SignificanceMethod::ChiSquared => chi_squared_2x2(subject, peer, config.continuity_correction),
        SignificanceMethod::TwoProportionZ => two_proportion_z(subject, peer),
    };

    match tested {
        Ok(t) => {
            let underperforms = subject.rate() < peer.rate();
            SignificanceOutcome {
                method,
                statistic: Some(t.statistic),
                p_value: Some(t.p_value),
                significant: underperforms && t.p_value < config.significance_alpha,
                skip: None,
            }
        }
        Err(reason) => SignificanceOutcome::skipped(method, reason),
    }
}

/// Pearson chi-squared test of independence on
/// `[[s_num, s_den - s_num], [p_num, p_den - p_num]]`.
///
/// The p-value is the upper tail of chi-squared(1) and so is two-sided in
/// the proportions; direction is applied by [`assess`].
pub fn chi_squared_2x2(
    subject: Proportion,
    peer: Proportion,
    continuity_correction: bool,
) -> Result<TestStatistic, SkipReason> {
    let table = contingency(subject, peer)?;

    let row_totals = [table[0][0] + table[0][1], table[1][0] + table[1][1]];
    let col_totals = [table[0][0] + table[1][0], table[0][1] + table[1][1]];
    let n = row_totals[0] + row_totals[1];

    let mut statistic = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / n;
            if expected <= 0.0 {
                return Err(SkipReason::DegenerateTable);
            }
            let mut deviation = (observed - expected).abs();
            if continuity_correction {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }

    let p_value = chi_squared_upper_tail(statistic).ok_or(SkipReason::DegenerateTable)?;
    Ok(TestStatistic { statistic, p_value })
}

/// Pooled two-proportion z-test with a two-sided p-value, `2 * P(Z <= -|z|)`.
///
/// `z^2` equals the uncorrected chi-squared statistic, so both tests give
/// the same p-value; direction is applied by [`assess`].
pub fn two_proportion_z(subject: Proportion, peer: Proportion) -> Result<TestStatistic, SkipReason> {
    // Same degeneracy rule as the chi-squared path.
    contingency(subject, peer)?;
    let n1 = subject.denominator as f64;
    let n2 = peer.denominator as f64;
    let pooled = (subject.numerator + peer.numerator) as f64 / (n1 + n2);
    if pooled <= 0.0 || pooled >= 1.0 {
        return Err(SkipReason::DegenerateTable);
    }

    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    let z = (subject.rate() - peer.rate()) / se;
    let p_value = standard_normal_cdf(-z.abs())
        .map(|tail| (2.0 * tail).min(1.0))
        .ok_or(SkipReason::DegenerateTable)?;
    Ok(TestStatistic {
        statistic: z,
        p_value,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn contingency(subject: Proportion, peer: Proportion) -> Result<[[f64; 2]; 2], SkipReason> {
    if subject.denominator == 0 || peer.denominator == 0 {
        return Err(SkipReason::ZeroDenominator);
    }
    let table = [
        [
            subject.numerator as f64,
            (subject.denominator - subject.numerator) as f64,
        ],
        [
            peer.numerator as f64,
            (peer.denominator - peer.numerator) as f64,
        ],
    ];
    // Rows are non-zero here; a zero column total makes an expected count zero.
    if table[0][0] + table[1][0] == 0.0 || table[0][1] + table[1][1] == 0.0 {
        return Err(SkipReason::DegenerateTable);
    }
    Ok(table)
}

fn chi_squared_upper_tail(statistic: f64) -> Option<f64> {
    let dist = ChiSquared::new(1.0).ok()?;
    Some((1.0 - dist.cdf(statistic)).clamp(0.0, 1.0))
}

fn standard_normal_cdf(z: f64) -> Option<f64> {
    let dist = Normal::new(0.0, 1.0).ok()?;
    Some(dist.cdf(z))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: Count, d: Count) -> Proportion {
        Proportion::new(n, d)
    }

    #[test]
    fn test_large_underperformance_is_significant() {
        // 10% vs 40%
        let out = assess(p(10, 100), p(400, 1000), &AnalysisConfig::default());
        assert!(out.significant);
        assert!(out.p_value.unwrap() < 0.001);
        assert!(out.skip.is_none());
    }

    #[test]
    fn test_uncorrected_statistic_matches_hand_calculation() {
        // Expected counts: 37.27, 62.73, 372.73, 627.27
        let t = chi_squared_2x2(p(10, 100), p(400, 1000), false).unwrap();
        let expected = 27.2727f64.powi(2) * (1.0 / 37.2727 + 1.0 / 62.7273 + 1.0 / 372.7273 + 1.0 / 627.2727);
        assert!((t.statistic - expected).abs() < 0.01, "got {}", t.statistic);
    }

    #[test]
    fn test_correction_lowers_statistic() {
        let raw = chi_squared_2x2(p(30, 100), p(400, 1000), false).unwrap();
        let yates = chi_squared_2x2(p(30, 100), p(400, 1000), true).unwrap();
        assert!(yates.statistic < raw.statistic);
        assert!(yates.p_value > raw.p_value);
    }

    #[test]
    fn test_overperformance_never_flagged() {
        let out = assess(p(400, 1000), p(10, 100), &AnalysisConfig::default());
        assert!(out.p_value.unwrap() < 0.05);
        assert!(!out.significant);
    }

    #[test]
    fn test_small_gap_not_significant() {
        let out = assess(p(38, 100), p(400, 1000), &AnalysisConfig::default());
        assert!(!out.significant);
    }

    #[test]
    fn test_zero_denominator_skips() {
        let out = assess(p(0, 0), p(400, 1000), &AnalysisConfig::default());
        assert_eq!(out.skip, Some(SkipReason::ZeroDenominator));
        assert!(!out.significant);
        assert!(out.p_value.is_none());
    }

    #[test]
    fn test_zero_expected_count_skips() {
        // Nobody lends in the category: numerator column is all zero.
        let out = assess(p(0, 100), p(0, 1000), &AnalysisConfig::default());
        assert_eq!(out.skip, Some(SkipReason::DegenerateTable));
        assert!(!out.significant);
    }

    #[test]
    fn test_z_test_agrees_on_edges_and_direction() {
        let cfg = AnalysisConfig {
            significance_method: SignificanceMethod::TwoProportionZ,
            ..Default::default()
        };
        assert!(assess(p(10, 100), p(400, 1000), &cfg).significant);
        assert!(!assess(p(400, 1000), p(10, 100), &cfg).significant);
        assert_eq!(
            assess(p(0, 100), p(0, 1000), &cfg).skip,
            Some(SkipReason::DegenerateTable)
        );
        assert_eq!(
            assess(p(5, 10), p(0, 0), &cfg).skip,
            Some(SkipReason::ZeroDenominator)
        );
    }

    #[test]
    fn test_yates_statistic_matches_reference() {
        // scipy.stats.chi2_contingency([[10, 90], [400, 600]]) -> 33.7233, 6.3534e-9
        let t = chi_squared_2x2(p(10, 100), p(400, 1000), true).unwrap();
        assert!((t.statistic - 33.72332).abs() < 1e-4, "got {}", t.statistic);
        assert!((t.p_value - 6.3534e-9).abs() < 1e-11, "got {}", t.p_value);

        let out = assess(p(10, 100), p(400, 1000), &AnalysisConfig::default());
        assert_eq!(out.statistic, Some(t.statistic));
    }

    #[test]
    fn test_yates_correction_floors_at_zero() {
        // Observed equals expected in every cell: |O - E| = 0 < 0.5.
        let t = chi_squared_2x2(p(5, 10), p(50, 100), true).unwrap();
        assert_eq!(t.statistic, 0.0);
        assert!((t.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_z_p_value_equals_uncorrected_chi_squared() {
        for (s, pe) in [(p(31, 100), p(400, 1000)), (p(10, 100), p(400, 1000)), (p(45, 120), p(300, 700))] {
            let chi = chi_squared_2x2(s, pe, false).unwrap();
            let z = two_proportion_z(s, pe).unwrap();
            assert!((z.statistic.powi(2) - chi.statistic).abs() < 1e-9);
            assert!((z.p_value - chi.p_value).abs() < 1e-9, "z {} vs chi {}", z.p_value, chi.p_value);
        }
    }

    #[test]
    fn test_methods_agree_on_verdict() {
        let chi_cfg = AnalysisConfig {
            continuity_correction: false,
            ..Default::default()
        };
        let z_cfg = AnalysisConfig {
            significance_method: SignificanceMethod::TwoProportionZ,
            ..Default::default()
        };
        // p = 0.0788 for both: not significant at 0.05.
        let chi = assess(p(31, 100), p(400, 1000), &chi_cfg);
        let z = assess(p(31, 100), p(400, 1000), &z_cfg);
        assert!(!chi.significant);
        assert_eq!(chi.significant, z.significant);
        assert!(!assess(p(31, 100), p(400, 1000), &AnalysisConfig::default()).significant);
    }

    #[test]
    fn test_z_statistic_sign() {
        let t = two_proportion_z(p(10, 100), p(400, 1000)).unwrap();
        assert!(t.statistic < 0.0);
        assert!(t.p_value < 0.05);
    }
}
