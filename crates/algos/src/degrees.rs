//! Degree computation.
//!
//! A single frontier pass with every vertex active; the edge compute
//! adds each scanned chunk's size to its bound vertex. `Direction::Both`
//! yields undirected degrees.

use std::sync::Arc;

use gds_engine::prelude::*;

pub const INVALID_DEGREE: u64 = u64::MAX;

pub struct Degrees {
    arrays: TableAtomicArrays<u64>,
}

impl Degrees {
    pub fn new(max_offsets: &TableMap<Offset>) -> Self {
        Self {
            arrays: TableAtomicArrays::new(max_offsets, 0),
        }
    }

    pub fn pin(&self, table: TableId) {
        self.arrays.pin(table);
    }

    pub fn value(&self, offset: Offset) -> u64 {
        self.arrays.get(offset)
    }

    pub fn add(&self, offset: Offset, count: u64) {
        self.arrays.fetch_add(offset, count);
    }

    pub fn decrease_by_one(&self, offset: Offset) {
        self.arrays.fetch_sub(offset, 1);
    }
}

#[derive(Clone)]
struct DegreeEdgeCompute<'a> {
    degrees: &'a Degrees,
}

impl EdgeCompute for DegreeEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, from: TableId, _to: TableId) {
        self.degrees.pin(from);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        _active: &mut Vec<NodeId>,
    ) {
        self.degrees.add(bound.offset, chunk.len() as u64);
    }
}

/// Populates `degrees` with one pass over all relationship tables.
pub fn compute_degrees<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    degrees: &Degrees,
    direction: Direction,
) -> Result<()> {
    let max_offsets = graph.max_offset_map();
    let frontier = Arc::new(PathLengths::new(&max_offsets));
    let frontier_pair = Arc::new(FrontierPair::single(
        frontier,
        max_offsets,
        ctx.thread_count(),
    ));
    frontier_pair.set_all_active();
    let mut state = GdsComputeState::new(frontier_pair, DegreeEdgeCompute { degrees });
    run_frontiers_until_convergence(ctx, &mut state, graph, direction, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undirected_degrees_count_both_sides() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (0, 2), (1, 2), (3, 0)]);
        let graph = builder.build();

        let ctx = ExecContext::new(2);
        let degrees = Degrees::new(&graph.max_offset_map());
        compute_degrees(&ctx, &graph, &degrees, Direction::Both).unwrap();

        degrees.pin(nodes);
        assert_eq!(degrees.value(0), 3);
        assert_eq!(degrees.value(1), 2);
        assert_eq!(degrees.value(2), 2);
        assert_eq!(degrees.value(3), 1);
    }

    #[test]
    fn directed_degrees_follow_the_direction() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(3);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (0, 2), (1, 2)]);
        let graph = builder.build();

        let ctx = ExecContext::new(1);
        let out_degrees = Degrees::new(&graph.max_offset_map());
        compute_degrees(&ctx, &graph, &out_degrees, Direction::Fwd).unwrap();

        out_degrees.pin(nodes);
        assert_eq!(out_degrees.value(0), 2);
        assert_eq!(out_degrees.value(1), 1);
        assert_eq!(out_degrees.value(2), 0);
    }
}
