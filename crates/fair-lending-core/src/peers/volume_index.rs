//! Volume index: who is active in each cell, and with how many loans.

use std::collections::BTreeMap;

use crate::table::CellTable;
use crate::types::*;

/// Read-only map from cell coordinate to `(entity_id, total)` pairs.
///
/// Built once per run before any matching starts; matching only ever takes
/// `&VolumeIndex`, so it can be shared across worker threads as-is.
#[derive(Debug, Clone, Default)]
pub struct VolumeIndex {
    cells: BTreeMap<CellKey, Vec<(EntityId, Count)>>,
}

impl VolumeIndex {
    pub fn build(table: &CellTable) -> Self {
        let mut cells: BTreeMap<CellKey, Vec<(EntityId, Count)>> = BTreeMap::new();
        for cell in table.cells() {
            cells
                .entry(cell.key.clone())
                .or_default()
                .push((cell.entity_id.clone(), cell.total));
        }
        for members in cells.values_mut() {
            members.sort_by(|a, b| a.0.cmp(&b.0));
        }
        tracing::debug!(coordinates = cells.len(), "volume index built");
        VolumeIndex { cells }
    }

    /// Entities active at `key`, sorted by entity id. Empty if the cell is unknown.
    pub fn members(&self, key: &CellKey) -> &[(EntityId, Count)] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total count for `entity_id` at `key`, if the entity is active there.
    pub fn volume(&self, key: &CellKey, entity_id: &str) -> Option<Count> {
        let members = self.members(key);
        members
            .binary_search_by(|(id, _)| id.as_str().cmp(entity_id))
            .ok()
            .map(|i| members[i].1)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::registry::{MetricDefinition, MetricRegistry};
    use crate::table::CellRow;

    fn row(entity: &str, geo: &str, total: i64) -> CellRow {
        CellRow {
            entity_id: entity.into(),
            year: 2023,
            geography_id: geo.into(),
            sub_geography_id: String::new(),
            loan_category: "refinance".into(),
            kind: "applications".into(),
            total_count: total,
            numerators: BTreeMap::from([("mmct".to_string(), 0)]),
        }
    }

    #[test]
    fn test_members_sorted_and_volume_lookup() {
        let registry = MetricRegistry::new(vec![MetricDefinition::new("mmct", "MMCT")]).unwrap();
        let rows = vec![row("C", "G1", 30), row("A", "G1", 10), row("B", "G2", 20)];
        let (table, _) = CellTable::from_rows(registry, &rows).unwrap();
        let index = VolumeIndex::build(&table);

        assert_eq!(index.len(), 2);
        let g1 = rows[0].key();
        let ids: Vec<&str> = index.members(&g1).iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(index.volume(&g1, "C"), Some(30));
        assert_eq!(index.volume(&g1, "B"), None);
    }
}
