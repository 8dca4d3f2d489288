//! All shortest paths (ASP) from one source.
//!
//! Destinations variant: per-vertex multiplicities count the number of
//! distinct shortest paths; a vertex's multiplicity grows by the bound
//! vertex's multiplicity when it is discovered for the first time or
//! re-discovered within the same iteration. The writer emits each
//! destination once per path.
//!
//! Paths variant: every equal-length parent is recorded in the parent
//! graph and the writer enumerates all alternatives.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use gds_engine::prelude::*;

use crate::output_writer::{LengthRow, PathRow, PathsMode, PathsWriter};
use crate::shortest_path::{all_masked_reached, new_single_frontier_pair, ShortestPathConfig};

/// Per-vertex shortest-path counts. The source starts at 1; counts
/// accumulate along the BFS wavefront.
pub struct Multiplicities {
    arrays: TableAtomicArrays<u64>,
}

impl Multiplicities {
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

    pub fn pair(&self) -> TableArrayPair<'_, u64> {
        TableArrayPair::new(&self.arrays)
    }
}

#[derive(Clone)]
struct AspDestinationsEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
    multiplicities: &'a TableArrayPair<'a, u64>,
}

impl EdgeCompute for AspDestinationsEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, from: TableId, to: TableId) {
        self.multiplicities.pin_cur(from);
        self.multiplicities.pin_next(to);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        let bound_multiplicity = self.multiplicities.cur_get(bound.offset);
        chunk.for_each(|nbr, _| {
            let nbr_val = self.frontier_pair.next().next_value(nbr.offset);
            // The neighbor's count grows when it is seen for the first
            // time or seen again within the same iteration; a hit in a
            // later iteration would be a longer path.
            if nbr_val == UNVISITED || nbr_val == self.frontier_pair.current_iter() {
                self.multiplicities
                    .next_fetch_add(nbr.offset, bound_multiplicity);
                if nbr_val == UNVISITED {
                    active.push(nbr);
                }
            }
        });
    }

    fn terminate(&mut self, mask: &NodeMask) -> bool {
        all_masked_reached(self.frontier_pair.next(), mask)
    }
}

struct AspPathsEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
    bfs_graph: &'a BfsGraph,
    block: Arc<ObjectBlock>,
}

impl<'a> AspPathsEdgeCompute<'a> {
    fn new(frontier_pair: &'a FrontierPair, bfs_graph: &'a BfsGraph) -> Self {
        Self {
            frontier_pair,
            bfs_graph,
            block: bfs_graph.add_new_block(),
        }
    }
}

impl Clone for AspPathsEdgeCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.frontier_pair, self.bfs_graph)
    }
}

impl EdgeCompute for AspPathsEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, _from: TableId, to: TableId) {
        self.bfs_graph.pin_table(to);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        chunk.for_each(|nbr, edge| {
            let nbr_val = self.frontier_pair.next().next_value(nbr.offset);
            if nbr_val == UNVISITED || nbr_val == self.frontier_pair.current_iter() {
                if !self.block.has_space() {
                    self.block = self.bfs_graph.add_new_block();
                }
                self.bfs_graph.add_parent(
                    self.frontier_pair.current_iter(),
                    bound,
                    edge,
                    nbr,
                    fwd,
                    &self.block,
                );
                if nbr_val == UNVISITED {
                    active.push(nbr);
                }
            }
        });
    }

    fn terminate(&mut self, mask: &NodeMask) -> bool {
        all_masked_reached(self.frontier_pair.next(), mask)
    }
}

/// Emits `(src, dst, length)` once per distinct shortest path.
struct AspDestinationsWriter<'a> {
    source: NodeId,
    path_lengths: &'a PathLengths,
    multiplicities: &'a Multiplicities,
    output_mask: &'a NodeMask,
    pool: &'a TablePool<LengthRow>,
    local: Vec<LengthRow>,
}

impl<'a> AspDestinationsWriter<'a> {
    fn new(
        source: NodeId,
        path_lengths: &'a PathLengths,
        multiplicities: &'a Multiplicities,
        output_mask: &'a NodeMask,
        pool: &'a TablePool<LengthRow>,
    ) -> Self {
        let local = pool.claim_local();
        Self {
            source,
            path_lengths,
            multiplicities,
            output_mask,
            pool,
            local,
        }
    }
}

impl Clone for AspDestinationsWriter<'_> {
    fn clone(&self) -> Self {
        Self::new(
            self.source,
            self.path_lengths,
            self.multiplicities,
            self.output_mask,
            self.pool,
        )
    }
}

impl VertexCompute for AspDestinationsWriter<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.path_lengths.pin_cur(table);
        self.multiplicities.pin(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            let dst = NodeId::new(offset, table);
            let length = self.path_lengths.cur_value(offset);
            if dst == self.source || length == UNVISITED || !self.output_mask.contains(dst) {
                continue;
            }
            let multiplicity = self.multiplicities.value(offset);
            for _ in 0..multiplicity {
                self.local.push(LengthRow {
                    src: self.source,
                    dst,
                    length: length as i64,
                });
            }
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}

/// Shortest-path lengths with one row per distinct shortest path.
pub fn all_sp_destinations<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: ShortestPathConfig,
) -> Result<Vec<LengthRow>> {
    config.validate()?;
    let max_offsets = graph.max_offset_map();
    let output_mask = Arc::new(config.output_mask(&max_offsets));
    let multiplicities = Multiplicities::new(&max_offsets);
    let pair = multiplicities.pair();
    pair.pin_next(source.table);
    pair.next_fetch_add(source.offset, 1);

    let frontier_pair = new_single_frontier_pair(ctx, max_offsets);
    frontier_pair.init_source(source);

    let edge_compute = AspDestinationsEdgeCompute {
        frontier_pair: &frontier_pair,
        multiplicities: &pair,
    };
    let mut state = GdsComputeState::new(Arc::clone(&frontier_pair), edge_compute)
        .with_output_mask(Arc::clone(&output_mask));
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, config.upper_bound)?;

    let pool = TablePool::new();
    let mut writer = AspDestinationsWriter::new(
        source,
        frontier_pair.next(),
        &multiplicities,
        &output_mask,
        &pool,
    );
    run_vertex_compute(ctx, graph, &mut writer)?;
    Ok(pool.merge_local_tables())
}

/// Every shortest path from `source` to every reached vertex.
pub fn all_sp_paths<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: ShortestPathConfig,
) -> Result<Vec<PathRow>> {
    config.validate()?;
    let max_offsets = graph.max_offset_map();
    let output_mask = Arc::new(config.output_mask(&max_offsets));
    let path_node_mask = config.path_node_mask(&max_offsets);
    let bfs_graph = BfsGraph::new(&max_offsets);
    let frontier_pair = new_single_frontier_pair(ctx, max_offsets);
    frontier_pair.init_source(source);

    let edge_compute = AspPathsEdgeCompute::new(&frontier_pair, &bfs_graph);
    let mut state = GdsComputeState::new(Arc::clone(&frontier_pair), edge_compute)
        .with_output_mask(Arc::clone(&output_mask));
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, config.upper_bound)?;

    let pool = TablePool::new();
    let counter = AtomicU64::new(0);
    let mut writer = PathsWriter::new(
        source,
        &bfs_graph,
        config.writer_info(1),
        PathsMode::Unweighted,
        false,
        &output_mask,
        &path_node_mask,
        &counter,
        &pool,
    );
    run_vertex_compute(ctx, graph, &mut writer)?;
    Ok(pool.merge_local_tables())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_cycle() -> (MemoryGraph, TableId) {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
        (builder.build(), nodes)
    }

    #[test]
    fn multiplicity_counts_distinct_shortest_paths() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 3,
            direction: Direction::Both,
            ..Default::default()
        };
        let rows =
            all_sp_destinations(&ExecContext::new(2), &graph, NodeId::new(0, nodes), config)
                .unwrap();

        // Node 2 is reachable by two distinct length-2 paths.
        let to_two: Vec<_> = rows.iter().filter(|r| r.dst.offset == 2).collect();
        assert_eq!(to_two.len(), 2);
        assert!(to_two.iter().all(|r| r.length == 2));
        assert_eq!(rows.iter().filter(|r| r.dst.offset == 1).count(), 1);
        assert_eq!(rows.iter().filter(|r| r.dst.offset == 3).count(), 1);
    }

    #[test]
    fn paths_enumerate_both_alternatives() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 3,
            direction: Direction::Both,
            ..Default::default()
        };
        let rows =
            all_sp_paths(&ExecContext::new(2), &graph, NodeId::new(0, nodes), config).unwrap();

        let mut to_two: Vec<_> = rows
            .iter()
            .filter(|r| r.dst.offset == 2)
            .map(|r| r.path_nodes[0].offset)
            .collect();
        to_two.sort_unstable();
        assert_eq!(to_two, vec![1, 3]);
        assert!(rows
            .iter()
            .filter(|r| r.dst.offset == 2)
            .all(|r| r.length == 2 && r.path_edges.len() == 2));
    }
}
