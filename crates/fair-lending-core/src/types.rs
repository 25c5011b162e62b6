use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loan or application counts. Never negative once a table is validated.
pub type Count = u64;

/// Proportions expressed as fractions (0.25 = 25%). Never as percentages.
pub type Share = Decimal;

/// Percentage points (subject share minus peer share, times 100).
pub type PercentagePoints = Decimal;

/// Lender identifier as supplied by the upstream extraction (e.g. an LEI).
pub type EntityId = String;

/// Cell coordinate with the entity dimension removed.
///
/// Field order defines the sort order, which every keyed collection in the
/// crate relies on for deterministic iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub year: i32,
    pub geography_id: String,
    pub sub_geography_id: String,
    pub loan_category: String,
    pub kind: String,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.year, self.geography_id, self.sub_geography_id, self.loan_category, self.kind
        )
    }
}

/// One validated row of the cell table.
///
/// `numerators` is aligned with the registry the table was validated
/// against: `numerators[i]` is the count for metric `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanCell {
    pub entity_id: EntityId,
    pub key: CellKey,
    pub total: Count,
    pub numerators: Vec<Count>,
}

/// Entity metadata side-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity_id: EntityId,
    pub display_name: String,
    #[serde(default)]
    pub category_tag: Option<String>,
}

/// Why a comparison, ratio or test could not be computed.
///
/// These are recorded in output rows, never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Subject is present in the cell but no other entity falls in its volume band.
    NoPeers,
    /// Subject or pooled peer denominator is zero.
    ZeroDenominator,
    /// A 2x2 table with a zero expected count.
    DegenerateTable,
    /// Subject and peer shares are both zero.
    UndefinedRatio,
}

/// Peer share over subject share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapRatio {
    Finite(Decimal),
    /// Subject share is zero while peers lend in the category.
    Unbounded,
}

impl GapRatio {
    /// Whether this ratio meets or exceeds `threshold`.
    pub fn meets(&self, threshold: Decimal) -> bool {
        match self {
            GapRatio::Finite(r) => *r >= threshold,
            GapRatio::Unbounded => true,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            GapRatio::Finite(r) => Some(*r),
            GapRatio::Unbounded => None,
        }
    }
}

impl fmt::Display for GapRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapRatio::Finite(r) => write!(f, "{}", r.round_dp(2)),
            GapRatio::Unbounded => write!(f, "inf"),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit shares, ieee754_f64 test statistics".to_string(),
        },
    }
}
