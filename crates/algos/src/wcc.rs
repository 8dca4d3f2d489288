//! Weakly Connected Components (WCC).
//!
//! Parallel label propagation: every vertex starts in its own component,
//! identified by its global offset, and edge computes publish the
//! smaller component id onto the neighbor with a monotonically
//! decreasing compare-and-swap. Extensions run in both directions, so
//! labels flow along edges regardless of orientation, and the driver
//! iterates until no label changed.

use std::sync::Arc;
use std::time::Instant;

use log::info;

use gds_engine::prelude::*;

use crate::component_ids::{
    ComponentIds, ComponentIdsPair, ComponentOutputCompute, ComponentRow, OffsetManager,
};

#[derive(Clone, Copy, Debug)]
pub struct WccConfig {
    pub max_iterations: u16,
}

impl Default for WccConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl WccConfig {
    pub const DEFAULT_MAX_ITERATIONS: u16 = 100;
}

#[derive(Clone)]
struct WccEdgeCompute<'a> {
    pair: &'a ComponentIdsPair<'a>,
}

impl EdgeCompute for WccEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, from: TableId, to: TableId) {
        self.pair.pin_cur(from);
        self.pair.pin_next(to);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        chunk.for_each(|nbr, _| {
            if self.pair.update_min(bound.offset, nbr.offset) {
                active.push(nbr);
            }
        });
    }
}

/// Runs WCC and returns one `(nodeID, group_id)` row per vertex. Two
/// vertices share a `group_id` iff an undirected path connects them.
pub fn wcc<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: WccConfig,
) -> Result<Vec<ComponentRow>> {
    let start = Instant::now();
    let max_offsets = graph.max_offset_map();
    let offsets = OffsetManager::new(&max_offsets);
    let ids = ComponentIds::sequence(&max_offsets, &offsets);
    let pair = ids.pair();

    // Vertices re-enter the frontier whenever their label drops, so the
    // current and next frontier need independent masks.
    let cur = Arc::new(PathLengths::new(&max_offsets));
    let next = Arc::new(PathLengths::new(&max_offsets));
    let frontier_pair = Arc::new(FrontierPair::double(
        cur,
        next,
        max_offsets,
        ctx.thread_count(),
    ));
    frontier_pair.set_all_active();

    let mut state = GdsComputeState::new(frontier_pair, WccEdgeCompute { pair: &pair });
    run_frontiers_until_convergence(ctx, &mut state, graph, Direction::Both, config.max_iterations)?;
    info!("WCC converged in {:?}", start.elapsed());

    let mask = NodeMask::disabled();
    let pool = TablePool::new();
    let mut output = ComponentOutputCompute::new(&ids, &mask, &pool);
    run_vertex_compute(ctx, graph, &mut output)?;
    Ok(pool.merge_local_tables())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_of(rows: &[ComponentRow], offset: Offset) -> i64 {
        rows.iter()
            .find(|row| row.node.offset == offset)
            .unwrap()
            .group_id
    }

    #[test]
    fn two_triangles_with_bridge_form_one_component() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(7);
        builder.add_rel_table(
            nodes,
            nodes,
            vec![
                (0, 1),
                (1, 2),
                (2, 0),
                (4, 5),
                (5, 6),
                (6, 4),
                (3, 4),
                (2, 3),
            ],
        );
        let graph = builder.build();

        let rows = wcc(&ExecContext::new(2), &graph, WccConfig::default()).unwrap();
        assert_eq!(rows.len(), 7);
        let group = group_of(&rows, 0);
        assert!(rows.iter().all(|row| row.group_id == group));
    }

    #[test]
    fn disconnected_parts_get_distinct_groups() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(5);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (3, 4)]);
        let graph = builder.build();

        let rows = wcc(&ExecContext::new(2), &graph, WccConfig::default()).unwrap();
        assert_eq!(group_of(&rows, 0), group_of(&rows, 2));
        assert_eq!(group_of(&rows, 3), group_of(&rows, 4));
        assert_ne!(group_of(&rows, 0), group_of(&rows, 3));
    }

    #[test]
    fn labels_cross_multiple_tables() {
        let mut builder = MemoryGraphBuilder::new();
        let left = builder.add_node_table(2);
        let right = builder.add_node_table(2);
        builder.add_rel_table(left, right, vec![(0, 0), (1, 1)]);
        let graph = builder.build();

        let rows = wcc(&ExecContext::new(2), &graph, WccConfig::default()).unwrap();
        assert_eq!(rows.len(), 4);
        let find = |table, offset| {
            rows.iter()
                .find(|r| r.node == NodeId::new(offset, table))
                .unwrap()
                .group_id
        };
        assert_eq!(find(left, 0), find(right, 0));
        assert_eq!(find(left, 1), find(right, 1));
        assert_ne!(find(left, 0), find(left, 1));
    }
}
