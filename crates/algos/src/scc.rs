//! Strongly Connected Components by forward/backward coloring.
//!
//! Each round resets both color arrays to the sequence identity, seeds
//! every unfinished vertex, and propagates the minimum color forward
//! along out-edges and backward along in-edges. A vertex whose two
//! colors agree lies in the component rooted at that color and is
//! finalized; rounds repeat until every vertex settled or the iteration
//! cap is hit. Finished vertices neither propagate nor accept colors,
//! so later rounds run on the residual graph only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use gds_engine::prelude::*;

use crate::component_ids::{
    ComponentIds, ComponentIdsPair, ComponentOutputCompute, ComponentRow, OffsetManager,
};
use crate::wcc::WccConfig;

pub type SccConfig = WccConfig;

#[derive(Clone)]
struct PropagateColorEdgeCompute<'a> {
    component_ids: &'a ComponentIds,
    colors: &'a ComponentIdsPair<'a>,
}

impl EdgeCompute for PropagateColorEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, from: TableId, to: TableId) {
        self.component_ids.pin(to);
        self.colors.pin_cur(from);
        self.colors.pin_next(to);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        chunk.for_each(|nbr, _| {
            if !self.component_ids.is_valid(nbr.offset)
                && self.colors.update_min(bound.offset, nbr.offset)
            {
                active.push(nbr);
            }
        });
    }
}

/// Seeds every unfinished vertex into the next frontier.
#[derive(Clone)]
struct SeedUnfinishedCompute<'a> {
    component_ids: &'a ComponentIds,
    frontier_pair: &'a FrontierPair,
}

impl VertexCompute for SeedUnfinishedCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.component_ids.pin(table);
        self.frontier_pair.pin_next_frontier(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, _table: TableId) {
        for offset in start..end {
            if !self.component_ids.is_valid(offset) {
                self.frontier_pair.add_node_to_next_frontier(offset);
            }
        }
    }
}

/// Seeds only root vertices (forward color equals own global offset)
/// for the backward sweep.
#[derive(Clone)]
struct SeedRootsCompute<'a> {
    component_ids: &'a ComponentIds,
    fwd_colors: &'a ComponentIds,
    offsets: &'a OffsetManager,
    frontier_pair: &'a FrontierPair,
}

impl VertexCompute for SeedRootsCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.component_ids.pin(table);
        self.fwd_colors.pin(table);
        self.offsets.pin(table);
        self.frontier_pair.pin_next_frontier(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, _table: TableId) {
        for offset in start..end {
            if self.component_ids.is_valid(offset) {
                continue;
            }
            if self.fwd_colors.get(offset) == self.offsets.current() + offset {
                self.frontier_pair.add_node_to_next_frontier(offset);
            }
        }
    }
}

/// Finalizes vertices whose forward and backward colors agree.
#[derive(Clone)]
struct SettleColorsCompute<'a> {
    component_ids: &'a ComponentIds,
    fwd_colors: &'a ComponentIds,
    bwd_colors: &'a ComponentIds,
    has_unsettled: &'a AtomicBool,
}

impl VertexCompute for SettleColorsCompute<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.component_ids.pin(table);
        self.fwd_colors.pin(table);
        self.bwd_colors.pin(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, _table: TableId) {
        for offset in start..end {
            if self.component_ids.is_valid(offset) {
                continue;
            }
            let fwd = self.fwd_colors.get(offset);
            let bwd = self.bwd_colors.get(offset);
            if fwd == bwd {
                self.component_ids.set(offset, fwd);
            } else {
                self.has_unsettled.store(true, Ordering::Relaxed);
            }
        }
    }
}

/// Runs the coloring SCC and returns one `(nodeID, group_id)` row per
/// vertex. Two vertices share a `group_id` iff each reaches the other.
pub fn scc<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: SccConfig,
) -> Result<Vec<ComponentRow>> {
    let max_offsets = graph.max_offset_map();
    let offsets = OffsetManager::new(&max_offsets);
    let component_ids = ComponentIds::unvisited(&max_offsets);
    let fwd_colors = ComponentIds::unvisited(&max_offsets);
    let bwd_colors = ComponentIds::unvisited(&max_offsets);
    let fwd_pair = fwd_colors.pair();
    let bwd_pair = bwd_colors.pair();

    let cur = Arc::new(PathLengths::new(&max_offsets));
    let next = Arc::new(PathLengths::new(&max_offsets));
    let frontier_pair = Arc::new(FrontierPair::double(
        cur,
        next,
        max_offsets,
        ctx.thread_count(),
    ));

    for round in 0..config.max_iterations {
        fwd_colors.reset_to_sequence(&offsets);
        bwd_colors.reset_to_sequence(&offsets);

        // Forward sweep.
        frontier_pair.reset();
        let mut seed = SeedUnfinishedCompute {
            component_ids: &component_ids,
            frontier_pair: &frontier_pair,
        };
        run_vertex_compute(ctx, graph, &mut seed)?;
        let mut fwd_state = GdsComputeState::new(
            Arc::clone(&frontier_pair),
            PropagateColorEdgeCompute {
                component_ids: &component_ids,
                colors: &fwd_pair,
            },
        );
        run_frontiers_until_convergence(
            ctx,
            &mut fwd_state,
            graph,
            Direction::Fwd,
            config.max_iterations,
        )?;
        ctx.update_progress((round as f64 + 0.5) / config.max_iterations as f64);

        // Backward sweep from the forward roots.
        frontier_pair.reset();
        let mut seed_roots = SeedRootsCompute {
            component_ids: &component_ids,
            fwd_colors: &fwd_colors,
            offsets: &offsets,
            frontier_pair: &frontier_pair,
        };
        run_vertex_compute(ctx, graph, &mut seed_roots)?;
        let mut bwd_state = GdsComputeState::new(
            Arc::clone(&frontier_pair),
            PropagateColorEdgeCompute {
                component_ids: &component_ids,
                colors: &bwd_pair,
            },
        );
        run_frontiers_until_convergence(
            ctx,
            &mut bwd_state,
            graph,
            Direction::Bwd,
            config.max_iterations,
        )?;

        let has_unsettled = AtomicBool::new(false);
        let mut settle = SettleColorsCompute {
            component_ids: &component_ids,
            fwd_colors: &fwd_colors,
            bwd_colors: &bwd_colors,
            has_unsettled: &has_unsettled,
        };
        run_vertex_compute(ctx, graph, &mut settle)?;
        ctx.update_progress((round as f64 + 1.0) / config.max_iterations as f64);

        if !has_unsettled.load(Ordering::Relaxed) {
            debug!("SCC settled after {} rounds", round + 1);
            break;
        }
    }

    let mask = NodeMask::disabled();
    let pool = TablePool::new();
    let mut output = ComponentOutputCompute::new(&component_ids, &mask, &pool);
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
    fn cycle_with_tail() {
        // 0 -> 1 -> 2 -> 0 and 3 -> 0.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 0), (3, 0)]);
        let graph = builder.build();

        let rows = scc(&ExecContext::new(2), &graph, SccConfig::default()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(group_of(&rows, 0), group_of(&rows, 1));
        assert_eq!(group_of(&rows, 0), group_of(&rows, 2));
        assert_ne!(group_of(&rows, 3), group_of(&rows, 0));
    }

    #[test]
    fn two_cycles_connected_one_way() {
        // Cycles {0,1} and {2,3} with a one-way bridge 1 -> 2.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 0), (2, 3), (3, 2), (1, 2)]);
        let graph = builder.build();

        let rows = scc(&ExecContext::new(2), &graph, SccConfig::default()).unwrap();
        assert_eq!(group_of(&rows, 0), group_of(&rows, 1));
        assert_eq!(group_of(&rows, 2), group_of(&rows, 3));
        assert_ne!(group_of(&rows, 0), group_of(&rows, 2));
    }

    #[test]
    fn directed_path_is_all_singletons() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(3);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2)]);
        let graph = builder.build();

        let rows = scc(&ExecContext::new(1), &graph, SccConfig::default()).unwrap();
        let mut groups: Vec<_> = rows.iter().map(|r| r.group_id).collect();
        groups.sort_unstable();
        groups.dedup();
        assert_eq!(groups.len(), 3);
    }
}
