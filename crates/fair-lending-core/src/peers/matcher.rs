//! Volume-band peer matching.
//!
//! A peer is any other entity active in the same cell whose total volume
//! lies within `[low * subject, high * subject]`. Both bounds inclusive.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::peers::volume_index::VolumeIndex;
use crate::types::*;

/// Inclusive volume band, as multiples of the subject's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerBounds {
    pub low: Decimal,
    pub high: Decimal,
}

impl PeerBounds {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        PeerBounds {
            low: config.volume_ratio_low,
            high: config.volume_ratio_high,
        }
    }

    pub fn contains(&self, subject_volume: Count, candidate_volume: Count) -> bool {
        let subject = Decimal::from(subject_volume);
        let candidate = Decimal::from(candidate_volume);
        candidate >= self.low * subject && candidate <= self.high * subject
    }
}

/// Peers of one subject in one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSet {
    pub subject_id: EntityId,
    pub key: CellKey,
    /// `None` when the subject is not active in the cell at all.
    pub subject_total: Option<Count>,
    /// `(entity_id, total)` in entity id order; never contains the subject.
    pub members: Vec<(EntityId, Count)>,
}

impl PeerSet {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.members.iter().any(|(id, _)| id == entity_id)
    }

    /// Combined volume of all peers; 0 is the "no peers" sentinel.
    pub fn peer_total(&self) -> Count {
        self.members.iter().map(|(_, n)| n).sum()
    }
}

/// Select the peers of `subject_id` at `key`.
///
/// An absent subject yields an empty set with `subject_total = None`; the
/// cell is simply not part of that subject's analysis.
pub fn match_peers(
    index: &VolumeIndex,
    subject_id: &str,
    key: &CellKey,
    bounds: PeerBounds,
) -> PeerSet {
    let subject_total = index.volume(key, subject_id);
    let members = match subject_total {
        Some(subject_volume) => index
            .members(key)
            .iter()
            .filter(|(id, volume)| id != subject_id && bounds.contains(subject_volume, *volume))
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    PeerSet {
        subject_id: subject_id.to_string(),
        key: key.clone(),
        subject_total,
        members,
    }
}
