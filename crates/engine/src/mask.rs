//! Per-table node masks.

use bitvec::prelude::*;

use crate::types::{NodeId, Offset, TableMap};

/// A set of vertices, one bitset per node table. A disabled mask accepts
/// every vertex, which keeps the check branch-predictable on the common
/// unfiltered path.
#[derive(Clone)]
pub struct NodeMask {
    masks: TableMap<BitVec>,
    enabled: bool,
}

impl NodeMask {
    pub fn disabled() -> Self {
        Self {
            masks: TableMap::default(),
            enabled: false,
        }
    }

    pub fn from_nodes<'a>(
        max_offsets: &TableMap<Offset>,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> Self {
        let mut masks: TableMap<BitVec> = max_offsets
            .iter()
            .map(|(&table, &len)| (table, bitvec![0; len as usize]))
            .collect();
        for node in nodes {
            masks
                .get_mut(&node.table)
                .expect("node table missing from mask")
                .set(node.offset as usize, true);
        }
        Self {
            masks,
            enabled: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn contains(&self, node: NodeId) -> bool {
        if !self.enabled {
            return true;
        }
        self.masks
            .get(&node.table)
            .map_or(false, |mask| mask[node.offset as usize])
    }

    /// Number of masked vertices across all tables.
    pub fn count_ones(&self) -> usize {
        self.masks.values().map(|mask| mask.count_ones()).sum()
    }

    /// Iterates the masked vertices. Empty for a disabled mask.
    pub fn iter_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.masks.iter().flat_map(|(&table, mask)| {
            mask.iter_ones()
                .map(move |offset| NodeId::new(offset as Offset, table))
        })
    }
}
