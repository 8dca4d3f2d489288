//! K-Core decomposition.
//!
//! Iteratively peels vertices of degree at most `k` for growing `k`:
//! a vertex sweep assigns the current core value to every unassigned
//! vertex whose residual degree dropped low enough and activates it;
//! one frontier pass then decrements the degrees of the peeled
//! vertices' neighbors, and the sweep repeats until the cascade dries
//! up. A vertex's core value is the largest `k` such that it survives
//! in the subgraph of minimum degree `k`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use gds_engine::prelude::*;

use crate::degrees::{compute_degrees, Degrees, INVALID_DEGREE};

#[derive(Clone, Copy, Debug)]
pub struct KCoreConfig {
    /// Cap on distinct core values; the loop normally ends when every
    /// vertex is assigned.
    pub max_iterations: u16,
}

impl Default for KCoreConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl KCoreConfig {
    pub const DEFAULT_MAX_ITERATIONS: u16 = 100;
}

/// One `(nodeID, k_degree)` output tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreRow {
    pub node: NodeId,
    pub k_degree: i64,
}

struct CoreValues {
    arrays: TableAtomicArrays<u64>,
}

impl CoreValues {
    fn new(max_offsets: &TableMap<Offset>) -> Self {
        Self {
            arrays: TableAtomicArrays::new(max_offsets, INVALID_DEGREE),
        }
    }

    fn pin(&self, table: TableId) {
        self.arrays.pin(table);
    }

    fn is_assigned(&self, offset: Offset) -> bool {
        self.arrays.get(offset) != INVALID_DEGREE
    }

    fn value(&self, offset: Offset) -> u64 {
        self.arrays.get(offset)
    }

    fn assign(&self, offset: Offset, core: u64) {
        self.arrays.set(offset, core);
    }
}

/// Assigns the current core value to unassigned vertices whose degree
/// dropped to it, and activates them for the degree-decrement pass.
#[derive(Clone)]
struct PeelVertexCompute<'a> {
    degrees: &'a Degrees,
    core_values: &'a CoreValues,
    frontier_pair: &'a FrontierPair,
    core: u64,
    peeled: &'a AtomicU64,
}

impl VertexCompute for PeelVertexCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.degrees.pin(table);
        self.core_values.pin(table);
        self.frontier_pair.pin_next_frontier(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, _table: TableId) {
        for offset in start..end {
            if self.core_values.is_assigned(offset) {
                continue;
            }
            if self.degrees.value(offset) <= self.core {
                self.core_values.assign(offset, self.core);
                self.frontier_pair.add_node_to_next_frontier(offset);
                self.peeled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(Clone)]
struct RemoveVertexEdgeCompute<'a> {
    degrees: &'a Degrees,
}

impl EdgeCompute for RemoveVertexEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, _from: TableId, to: TableId) {
        self.degrees.pin(to);
    }

    fn edge_compute(
        &mut self,
        _bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        _active: &mut Vec<NodeId>,
    ) {
        chunk.for_each(|nbr, _| self.degrees.decrease_by_one(nbr.offset));
    }
}

struct CoreOutputCompute<'a> {
    core_values: &'a CoreValues,
    pool: &'a TablePool<CoreRow>,
    local: Vec<CoreRow>,
}

impl<'a> CoreOutputCompute<'a> {
    fn new(core_values: &'a CoreValues, pool: &'a TablePool<CoreRow>) -> Self {
        let local = pool.claim_local();
        Self {
            core_values,
            pool,
            local,
        }
    }
}

impl Clone for CoreOutputCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.core_values, self.pool)
    }
}

impl VertexCompute for CoreOutputCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.core_values.pin(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            self.local.push(CoreRow {
                node: NodeId::new(offset, table),
                k_degree: self.core_values.value(offset) as i64,
            });
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}

/// Runs the decomposition and returns one `(nodeID, k_degree)` row per
/// vertex.
pub fn k_core<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: KCoreConfig,
) -> Result<Vec<CoreRow>> {
    let max_offsets = graph.max_offset_map();
    let degrees = Degrees::new(&max_offsets);
    compute_degrees(ctx, graph, &degrees, Direction::Both)?;
    let core_values = CoreValues::new(&max_offsets);

    let cur = Arc::new(PathLengths::new(&max_offsets));
    let next = Arc::new(PathLengths::new(&max_offsets));
    let frontier_pair = Arc::new(FrontierPair::double(
        cur,
        next,
        max_offsets,
        ctx.thread_count(),
    ));

    let mut state = GdsComputeState::new(
        Arc::clone(&frontier_pair),
        RemoveVertexEdgeCompute { degrees: &degrees },
    );

    let total_nodes = graph.total_node_count();
    let mut assigned = 0;
    let mut core = 0u64;
    while assigned < total_nodes && core < config.max_iterations as u64 {
        loop {
            let peeled = AtomicU64::new(0);
            let mut peel = PeelVertexCompute {
                degrees: &degrees,
                core_values: &core_values,
                frontier_pair: &frontier_pair,
                core,
                peeled: &peeled,
            };
            run_vertex_compute(ctx, graph, &mut peel)?;
            let peeled = peeled.load(Ordering::Relaxed);
            if peeled == 0 {
                break;
            }
            assigned += peeled;
            // One extension step removes the peeled vertices from their
            // neighbors' degrees; the next sweep may then peel more.
            run_frontiers_until_convergence(
                ctx,
                &mut state,
                graph,
                Direction::Both,
                frontier_pair.current_iter() + 1,
            )?;
        }
        debug!("k-core: {assigned}/{total_nodes} assigned after core {core}");
        ctx.update_progress(assigned as f64 / total_nodes as f64);
        core += 1;
    }

    let pool = TablePool::new();
    let mut output = CoreOutputCompute::new(&core_values, &pool);
    run_vertex_compute(ctx, graph, &mut output)?;
    Ok(pool.merge_local_tables())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_of(rows: &[CoreRow], offset: Offset) -> i64 {
        rows.iter()
            .find(|row| row.node.offset == offset)
            .unwrap()
            .k_degree
    }

    #[test]
    fn k4_with_isolated_vertex() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(5);
        builder.add_rel_table(
            nodes,
            nodes,
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)],
        );
        let graph = builder.build();

        let rows = k_core(&ExecContext::new(2), &graph, KCoreConfig::default()).unwrap();
        assert_eq!(rows.len(), 5);
        for offset in 0..4 {
            assert_eq!(core_of(&rows, offset), 3);
        }
        assert_eq!(core_of(&rows, 4), 0);
    }

    #[test]
    fn triangle_with_pendant() {
        // Triangle 0-1-2 plus pendant 3 attached to 0.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 0), (0, 3)]);
        let graph = builder.build();

        let rows = k_core(&ExecContext::new(2), &graph, KCoreConfig::default()).unwrap();
        assert_eq!(core_of(&rows, 3), 1);
        for offset in 0..3 {
            assert_eq!(core_of(&rows, offset), 2);
        }
    }
}
