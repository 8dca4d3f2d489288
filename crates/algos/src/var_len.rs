//! Variable-length joins: every walk between `lower_bound` and
//! `upper_bound` hops from one source.
//!
//! Unlike the shortest-path family, every scanned neighbor is activated
//! and every traversed edge records a parent, so the parent chains carry
//! records of several iterations and the writer enumerates all walks.
//! Re-activation means a vertex can re-enter the frontier, so the pair
//! uses two independent masks.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use gds_engine::prelude::*;

use crate::output_writer::{PathRow, PathSemantic, PathWriterInfo, PathsMode, PathsWriter};

#[derive(Clone, Debug)]
pub struct VarLenConfig {
    pub lower_bound: u16,
    pub upper_bound: u16,
    pub direction: Direction,
    pub semantic: PathSemantic,
    pub extend_from_source: bool,
    pub write_direction: bool,
    pub limit: Option<u64>,
    pub output_nodes: Option<Vec<NodeId>>,
    pub path_nodes: Option<Vec<NodeId>>,
}

impl Default for VarLenConfig {
    fn default() -> Self {
        Self {
            lower_bound: 1,
            upper_bound: 1,
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

impl VarLenConfig {
    /// Walk enumeration is exponential in the hop count; the cap keeps
    /// the iteration tags far away from the `u16` sentinel as well.
    pub const MAX_UPPER_BOUND: u16 = 255;

    pub fn validate(&self) -> Result<()> {
        if self.lower_bound > self.upper_bound {
            return Err(Error::Binder(format!(
                "lower bound {} exceeds upper bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.upper_bound > Self::MAX_UPPER_BOUND {
            return Err(Error::Binder(format!(
                "upper bound must be at most {}",
                Self::MAX_UPPER_BOUND
            )));
        }
        Ok(())
    }
}

struct VarLenEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
    bfs_graph: &'a BfsGraph,
    block: Arc<ObjectBlock>,
}

impl<'a> VarLenEdgeCompute<'a> {
    fn new(frontier_pair: &'a FrontierPair, bfs_graph: &'a BfsGraph) -> Self {
        Self {
            frontier_pair,
            bfs_graph,
            block: bfs_graph.add_new_block(),
        }
    }
}

impl Clone for VarLenEdgeCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.frontier_pair, self.bfs_graph)
    }
}

impl EdgeCompute for VarLenEdgeCompute<'_> {
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
            // Every walk extension counts, visited or not.
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
            active.push(nbr);
        });
    }
}

/// Enumerates every walk of `lower_bound..=upper_bound` hops from
/// `source`. With `lower_bound == 0` the empty path from the source to
/// itself is emitted when no non-empty walk reaches it.
pub fn var_len_joins<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: VarLenConfig,
) -> Result<Vec<PathRow>> {
    config.validate()?;
    let max_offsets = graph.max_offset_map();
    let output_mask = Arc::new(match &config.output_nodes {
        Some(nodes) => NodeMask::from_nodes(&max_offsets, nodes),
        None => NodeMask::disabled(),
    });
    let path_node_mask = match &config.path_nodes {
        Some(nodes) => NodeMask::from_nodes(&max_offsets, nodes),
        None => NodeMask::disabled(),
    };
    let bfs_graph = BfsGraph::new(&max_offsets);

    let cur = Arc::new(PathLengths::new(&max_offsets));
    let next = Arc::new(PathLengths::new(&max_offsets));
    let frontier_pair = Arc::new(FrontierPair::double(
        cur,
        next,
        max_offsets,
        ctx.thread_count(),
    ));
    frontier_pair.init_source(source);

    let edge_compute = VarLenEdgeCompute::new(&frontier_pair, &bfs_graph);
    let mut state = GdsComputeState::new(Arc::clone(&frontier_pair), edge_compute);
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, config.upper_bound)?;

    let info = PathWriterInfo {
        lower_bound: config.lower_bound,
        semantic: config.semantic,
        extend_from_source: config.extend_from_source,
        write_direction: config.write_direction,
        limit: config.limit,
    };
    let pool = TablePool::new();
    let counter = AtomicU64::new(0);
    let mut writer = PathsWriter::new(
        source,
        &bfs_graph,
        info,
        PathsMode::Unweighted,
        true,
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

    fn path_graph() -> (MemoryGraph, TableId) {
        // 0 -> 1 -> 2 -> 3
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 3)]);
        (builder.build(), nodes)
    }

    #[test]
    fn bounded_walks_on_a_path() {
        let (graph, nodes) = path_graph();
        let config = VarLenConfig {
            lower_bound: 2,
            upper_bound: 3,
            ..Default::default()
        };
        let rows =
            var_len_joins(&ExecContext::new(2), &graph, NodeId::new(0, nodes), config).unwrap();

        let mut reached: Vec<_> = rows.iter().map(|r| (r.dst.offset, r.length)).collect();
        reached.sort_unstable();
        assert_eq!(reached, vec![(2, 2), (3, 3)]);
    }

    #[test]
    fn cycle_walks_respect_semantics() {
        // 0 <-> 1 with a tail to 2.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(3);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 0), (1, 2)]);
        let graph = builder.build();
        let source = NodeId::new(0, nodes);

        let walks = var_len_joins(
            &ExecContext::new(1),
            &graph,
            source,
            VarLenConfig {
                lower_bound: 1,
                upper_bound: 3,
                ..Default::default()
            },
        )
        .unwrap();
        // Walks may revisit: 0-1, 0-1-0, 0-1-2, 0-1-0-1, 0-1-0-2? No:
        // edges are directed; from 0: [1], [1,0], [1,2], [1,0,1].
        assert_eq!(walks.len(), 4);

        let acyclic = var_len_joins(
            &ExecContext::new(1),
            &graph,
            source,
            VarLenConfig {
                lower_bound: 1,
                upper_bound: 3,
                semantic: PathSemantic::Acyclic,
                ..Default::default()
            },
        )
        .unwrap();
        // Node repetition forbidden: 0-1 and 0-1-2 only.
        let mut lengths: Vec<_> = acyclic.iter().map(|r| (r.dst.offset, r.length)).collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn lower_bound_zero_emits_empty_path_for_source() {
        let (graph, nodes) = path_graph();
        let config = VarLenConfig {
            lower_bound: 0,
            upper_bound: 1,
            ..Default::default()
        };
        let rows =
            var_len_joins(&ExecContext::new(1), &graph, NodeId::new(3, nodes), config).unwrap();

        // Node 3 has no outgoing edges: only the empty path survives.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dst, NodeId::new(3, nodes));
        assert_eq!(rows[0].length, 0);
        assert!(rows[0].path_edges.is_empty());
    }

    #[test]
    fn trail_semantics_forbid_edge_reuse() {
        // Two parallel edges 0 -> 1 and an edge back.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(2);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (0, 1), (1, 0)]);
        let graph = builder.build();

        let rows = var_len_joins(
            &ExecContext::new(1),
            &graph,
            NodeId::new(0, nodes),
            VarLenConfig {
                lower_bound: 3,
                upper_bound: 3,
                semantic: PathSemantic::Trail,
                ..Default::default()
            },
        )
        .unwrap();
        // Length-3 trails: 0-(e0)->1-(e2)->0-(e1)->1 and 0-(e1)->1-(e2)->0-(e0)->1.
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.dst.offset, 1);
            let mut edges: Vec<_> = row.path_edges.iter().map(|e| e.offset).collect();
            edges.sort_unstable();
            assert_eq!(edges, vec![0, 1, 2]);
        }
    }
}
