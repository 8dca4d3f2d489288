//! Single shortest paths (SP) from one source.
//!
//! Unweighted BFS over the frontier pair: a neighbor joins the next
//! frontier the first time it is seen, and its discovery iteration is
//! its path length. The paths variant additionally records exactly one
//! parent per vertex through a single-parent compare-and-swap, so path
//! enumeration walks a unique chain; which of several equal-length
//! parents wins is decided by the CAS race.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use gds_engine::prelude::*;

use crate::output_writer::{
    DestinationsWriter, LengthRow, PathRow, PathSemantic, PathWriterInfo, PathsMode, PathsWriter,
};

/// Shared configuration of the recursive-join family.
#[derive(Clone, Debug)]
pub struct ShortestPathConfig {
    /// Iteration cap; also the maximum path length.
    pub upper_bound: u16,
    pub direction: Direction,
    pub semantic: PathSemantic,
    pub extend_from_source: bool,
    /// Emit a per-edge direction column; only meaningful with
    /// [`Direction::Both`].
    pub write_direction: bool,
    /// Stop after this many output tuples.
    pub limit: Option<u64>,
    /// Restrict output to these destinations.
    pub output_nodes: Option<Vec<NodeId>>,
    /// Restrict intermediate path nodes to this set.
    pub path_nodes: Option<Vec<NodeId>>,
}

impl Default for ShortestPathConfig {
    fn default() -> Self {
        Self {
            upper_bound: Self::DEFAULT_UPPER_BOUND,
            direction: Direction::Fwd,
            semantic: PathSemantic::Walk,
            extend_from_source: true,
            write_direction: false,
            limit: None,
            output_nodes: None,
            path_nodes: None,
        }
    }
}

impl ShortestPathConfig {
    pub const DEFAULT_UPPER_BOUND: u16 = 255;

    pub fn validate(&self) -> Result<()> {
        if self.upper_bound == 0 {
            return Err(Error::Binder(
                "upper bound must be at least 1".to_owned(),
            ));
        }
        if self.upper_bound == u16::MAX {
            return Err(Error::Binder(format!(
                "upper bound must be smaller than {}",
                u16::MAX
            )));
        }
        Ok(())
    }

    pub(crate) fn output_mask(&self, max_offsets: &TableMap<Offset>) -> NodeMask {
        match &self.output_nodes {
            Some(nodes) => NodeMask::from_nodes(max_offsets, nodes),
            None => NodeMask::disabled(),
        }
    }

    pub(crate) fn path_node_mask(&self, max_offsets: &TableMap<Offset>) -> NodeMask {
        match &self.path_nodes {
            Some(nodes) => NodeMask::from_nodes(max_offsets, nodes),
            None => NodeMask::disabled(),
        }
    }

    pub(crate) fn writer_info(&self, lower_bound: u16) -> PathWriterInfo {
        PathWriterInfo {
            lower_bound,
            semantic: self.semantic,
            extend_from_source: self.extend_from_source,
            write_direction: self.write_direction,
            limit: self.limit,
        }
    }
}

pub(crate) fn new_single_frontier_pair(
    ctx: &ExecContext,
    max_offsets: TableMap<Offset>,
) -> Arc<FrontierPair> {
    let frontier = Arc::new(PathLengths::new(&max_offsets));
    Arc::new(FrontierPair::single(
        frontier,
        max_offsets,
        ctx.thread_count(),
    ))
}

/// True once every masked destination has been reached; consulted by
/// the driver between iterations.
pub(crate) fn all_masked_reached(frontier: &PathLengths, mask: &NodeMask) -> bool {
    mask.iter_nodes()
        .all(|node| frontier.table(node.table).get(node.offset) != UNVISITED)
}

#[derive(Clone)]
struct SpDestinationsEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
}

impl EdgeCompute for SpDestinationsEdgeCompute<'_> {
    fn edge_compute(
        &mut self,
        _bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        chunk.for_each(|nbr, _| {
            if self.frontier_pair.next().next_value(nbr.offset) == UNVISITED {
                active.push(nbr);
            }
        });
    }

    fn terminate(&mut self, mask: &NodeMask) -> bool {
        all_masked_reached(self.frontier_pair.next(), mask)
    }
}

struct SpPathsEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
    bfs_graph: &'a BfsGraph,
    block: Arc<ObjectBlock>,
}

impl<'a> SpPathsEdgeCompute<'a> {
    fn new(frontier_pair: &'a FrontierPair, bfs_graph: &'a BfsGraph) -> Self {
        Self {
            frontier_pair,
            bfs_graph,
            block: bfs_graph.add_new_block(),
        }
    }
}

impl Clone for SpPathsEdgeCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.frontier_pair, self.bfs_graph)
    }
}

impl EdgeCompute for SpPathsEdgeCompute<'_> {
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
            if self.frontier_pair.next().next_value(nbr.offset) == UNVISITED {
                if !self.block.has_space() {
                    self.block = self.bfs_graph.add_new_block();
                }
                self.bfs_graph.add_single_parent(
                    self.frontier_pair.current_iter(),
                    bound,
                    edge,
                    nbr,
                    fwd,
                    &self.block,
                );
                active.push(nbr);
            }
        });
    }

    fn terminate(&mut self, mask: &NodeMask) -> bool {
        all_masked_reached(self.frontier_pair.next(), mask)
    }
}

/// Lengths of the shortest path from `source` to every reached vertex.
pub fn single_sp_destinations<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: ShortestPathConfig,
) -> Result<Vec<LengthRow>> {
    config.validate()?;
    let max_offsets = graph.max_offset_map();
    let output_mask = Arc::new(config.output_mask(&max_offsets));
    let frontier_pair = new_single_frontier_pair(ctx, max_offsets);
    frontier_pair.init_source(source);

    let edge_compute = SpDestinationsEdgeCompute {
        frontier_pair: &frontier_pair,
    };
    let mut state = GdsComputeState::new(Arc::clone(&frontier_pair), edge_compute)
        .with_output_mask(Arc::clone(&output_mask));
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, config.upper_bound)?;

    let pool = TablePool::new();
    let mut writer =
        DestinationsWriter::new(source, frontier_pair.next(), &output_mask, &pool);
    run_vertex_compute(ctx, graph, &mut writer)?;
    Ok(pool.merge_local_tables())
}

/// One shortest path from `source` to every reached vertex.
pub fn single_sp_paths<G: Graph + ?Sized>(
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

    let edge_compute = SpPathsEdgeCompute::new(&frontier_pair, &bfs_graph);
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
        // 0 - 1 - 2 - 3 - 0, undirected via Direction::Both.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
        (builder.build(), nodes)
    }

    #[test]
    fn destinations_on_four_cycle() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 3,
            direction: Direction::Both,
            ..Default::default()
        };
        let mut rows =
            single_sp_destinations(&ExecContext::new(2), &graph, NodeId::new(0, nodes), config)
                .unwrap();
        rows.sort_by_key(|row| row.dst.offset);

        let lengths: Vec<_> = rows.iter().map(|r| (r.dst.offset, r.length)).collect();
        assert_eq!(lengths, vec![(1, 1), (2, 2), (3, 1)]);
    }

    #[test]
    fn paths_emit_exactly_one_path_per_destination() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 3,
            direction: Direction::Both,
            ..Default::default()
        };
        let rows =
            single_sp_paths(&ExecContext::new(2), &graph, NodeId::new(0, nodes), config).unwrap();

        assert_eq!(rows.len(), 3);
        let to_two: Vec<_> = rows.iter().filter(|r| r.dst.offset == 2).collect();
        assert_eq!(to_two.len(), 1);
        let path = to_two[0];
        assert_eq!(path.length, 2);
        assert_eq!(path.path_edges.len(), 2);
        assert_eq!(path.path_nodes.len(), 1);
        // The single recorded parent chain goes through node 1 or 3.
        assert!(matches!(path.path_nodes[0].offset, 1 | 3));
    }

    #[test]
    fn upper_bound_caps_the_search() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 1,
            direction: Direction::Both,
            ..Default::default()
        };
        let rows =
            single_sp_destinations(&ExecContext::new(1), &graph, NodeId::new(0, nodes), config)
                .unwrap();
        let mut reached: Vec<_> = rows.iter().map(|r| r.dst.offset).collect();
        reached.sort_unstable();
        assert_eq!(reached, vec![1, 3]);
    }

    #[test]
    fn output_mask_limits_rows() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 3,
            direction: Direction::Both,
            output_nodes: Some(vec![NodeId::new(2, nodes)]),
            ..Default::default()
        };
        let rows =
            single_sp_destinations(&ExecContext::new(1), &graph, NodeId::new(0, nodes), config)
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dst.offset, 2);
        assert_eq!(rows[0].length, 2);
    }

    #[test]
    fn rejects_zero_upper_bound() {
        let (graph, nodes) = four_cycle();
        let config = ShortestPathConfig {
            upper_bound: 0,
            ..Default::default()
        };
        let result =
            single_sp_destinations(&ExecContext::new(1), &graph, NodeId::new(0, nodes), config);
        assert!(matches!(result, Err(Error::Binder(_))));
    }
}
