//! Metric registry.
//!
//! The registry names the numerator columns of the cell table. Each metric's
//! predicate (e.g. "property in a majority-minority tract") is already
//! applied upstream; the registry only fixes the order and labels that every
//! later stage indexes by.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::FairLendingError;
use crate::FairLendingResult;

/// A single named lending metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Column identifier in the cell table.
    pub id: String,
    /// Human-readable label for reports.
    pub label: String,
}

impl MetricDefinition {
    pub fn new(id: &str, label: &str) -> Self {
        MetricDefinition {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

/// Ordered, duplicate-free list of metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRegistry {
    metrics: Vec<MetricDefinition>,
}

impl MetricRegistry {
    pub fn new(metrics: Vec<MetricDefinition>) -> FairLendingResult<Self> {
        if metrics.is_empty() {
            return Err(FairLendingError::config(
                "metrics",
                "Metric registry must contain at least one metric.",
            ));
        }
        let mut seen = BTreeSet::new();
        for m in &metrics {
            if m.id.trim().is_empty() {
                return Err(FairLendingError::config(
                    "metrics",
                    "Metric identifiers must be non-empty.",
                ));
            }
            if !seen.insert(m.id.as_str()) {
                return Err(FairLendingError::config(
                    "metrics",
                    format!("Duplicate metric identifier '{}'.", m.id),
                ));
            }
        }
        Ok(MetricRegistry { metrics })
    }

    /// The conventional HMDA fair-lending battery.
    pub fn standard() -> Self {
        MetricRegistry {
            metrics: vec![
                MetricDefinition::new("lmib", "Low-to-moderate income borrowers"),
                MetricDefinition::new("lmict", "Low-to-moderate income tracts"),
                MetricDefinition::new("mmct", "Majority-minority census tracts"),
                MetricDefinition::new("black", "Black borrowers"),
                MetricDefinition::new("hispanic", "Hispanic borrowers"),
                MetricDefinition::new("asian", "Asian borrowers"),
                MetricDefinition::new("native_american", "Native American borrowers"),
                MetricDefinition::new("hopi", "Hawaiian or Pacific Islander borrowers"),
                MetricDefinition::new("black_hispanic_mmct", "Black and Hispanic majority tracts"),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MetricDefinition> {
        self.metrics.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m.id == id)
    }

    /// Resolve a metric reference, failing on names the registry doesn't know.
    pub fn require(&self, id: &str) -> FairLendingResult<usize> {
        self.index_of(id).ok_or_else(|| {
            FairLendingError::config(
                "metric",
                format!(
                    "Unknown metric '{}'. Registered: {:?}.",
                    id,
                    self.metrics.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()
                ),
            )
        })
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        MetricRegistry::standard()
    }
}
