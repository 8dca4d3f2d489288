//! Per-vertex component-id arrays shared by the connectivity algorithms.

use std::sync::atomic::{AtomicU64, Ordering};

use gds_engine::prelude::*;

pub const INVALID_COMPONENT: Offset = INVALID_OFFSET;

/// One `(nodeID, group_id)` output tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentRow {
    pub node: NodeId,
    pub group_id: i64,
}

/// Global start offset per node table, so component ids drawn from
/// `start + offset` are unique across tables. Tables are numbered in
/// ascending table-id order.
pub struct OffsetManager {
    starts: TableMap<Offset>,
    current: AtomicU64,
}

impl OffsetManager {
    pub fn new(max_offsets: &TableMap<Offset>) -> Self {
        let mut tables: Vec<_> = max_offsets.iter().map(|(&t, &n)| (t, n)).collect();
        tables.sort_unstable();
        let mut starts = TableMap::default();
        let mut start = 0;
        for (table, count) in tables {
            starts.insert(table, start);
            start += count;
        }
        Self {
            starts,
            current: AtomicU64::new(0),
        }
    }

    pub fn pin(&self, table: TableId) {
        self.current
            .store(self.start_offset(table), Ordering::Relaxed);
    }

    pub fn start_offset(&self, table: TableId) -> Offset {
        self.starts[&table]
    }

    pub fn current(&self) -> Offset {
        self.current.load(Ordering::Relaxed)
    }
}

/// Dense per-vertex component ids (or colors), one array per table.
pub struct ComponentIds {
    arrays: TableAtomicArrays<u64>,
}

impl ComponentIds {
    /// Every vertex starts without a component.
    pub fn unvisited(max_offsets: &TableMap<Offset>) -> Self {
        Self {
            arrays: TableAtomicArrays::new(max_offsets, INVALID_COMPONENT),
        }
    }

    /// Every vertex starts in its own component, identified by its
    /// global offset.
    pub fn sequence(max_offsets: &TableMap<Offset>, offsets: &OffsetManager) -> Self {
        let ids = Self::unvisited(max_offsets);
        ids.reset_to_sequence(offsets);
        ids
    }

    /// Rewrites every vertex back to the sequence identity; the colored
    /// sweeps do this at the start of every round.
    pub fn reset_to_sequence(&self, offsets: &OffsetManager) {
        for (table, array) in self.arrays.tables() {
            let start = offsets.start_offset(table);
            for pos in 0..array.len() {
                array.set(pos, start + pos);
            }
        }
    }

    pub fn pin(&self, table: TableId) {
        self.arrays.pin(table);
    }

    pub fn get(&self, offset: Offset) -> Offset {
        self.arrays.get(offset)
    }

    pub fn set(&self, offset: Offset, component: Offset) {
        self.arrays.set(offset, component);
    }

    pub fn is_valid(&self, offset: Offset) -> bool {
        self.get(offset) != INVALID_COMPONENT
    }

    pub fn arrays(&self) -> &TableAtomicArrays<u64> {
        &self.arrays
    }

    pub fn pair(&self) -> ComponentIdsPair<'_> {
        TableArrayPair::new(&self.arrays)
    }
}

/// Current/next view used by edge computes: read the bound vertex's id,
/// CAS the neighbor's id down.
pub type ComponentIdsPair<'a> = TableArrayPair<'a, u64>;

/// Writes `(nodeID, group_id)` rows for every vertex the mask admits.
pub struct ComponentOutputCompute<'a> {
    ids: &'a ComponentIds,
    output_mask: &'a NodeMask,
    pool: &'a TablePool<ComponentRow>,
    local: Vec<ComponentRow>,
}

impl<'a> ComponentOutputCompute<'a> {
    pub fn new(
        ids: &'a ComponentIds,
        output_mask: &'a NodeMask,
        pool: &'a TablePool<ComponentRow>,
    ) -> Self {
        let local = pool.claim_local();
        Self {
            ids,
            output_mask,
            pool,
            local,
        }
    }
}

impl Clone for ComponentOutputCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.ids, self.output_mask, self.pool)
    }
}

impl VertexCompute for ComponentOutputCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.ids.pin(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            let node = NodeId::new(offset, table);
            if !self.output_mask.contains(node) {
                continue;
            }
            self.local.push(ComponentRow {
                node,
                group_id: self.ids.get(offset) as i64,
            });
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}
