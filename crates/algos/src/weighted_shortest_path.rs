//! Weighted shortest paths (WSP) and all weighted shortest paths (AWSP)
//! from one source.
//!
//! The relaxation is a monotonically-decreasing compare-and-swap on a
//! per-vertex cost: a neighbor re-enters the frontier whenever its cost
//! strictly drops, and the driver keeps iterating as long as any swap
//! succeeded. This is only correct for non-negative edge weights; the
//! relaxation never revisits a settled cost that a negative edge would
//! have to reopen.
//!
//! The paths variants record the winning parent per vertex (WSP) or all
//! equal-cost minimum parents (AWSP) in the parent graph; the source
//! carries a cost-0 anchor record the writer stops at.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use gds_engine::prelude::*;

use crate::output_writer::{
    CostRow, PathRow, PathSemantic, PathWriterInfo, PathsMode, PathsWriter,
};

#[derive(Clone, Debug)]
pub struct WeightedPathConfig {
    /// Numeric edge property read as weight. Empty means every edge
    /// weighs [`DEFAULT_WEIGHT`].
    pub weight_property: String,
    pub direction: Direction,
    pub semantic: PathSemantic,
    pub extend_from_source: bool,
    pub write_direction: bool,
    pub limit: Option<u64>,
    pub output_nodes: Option<Vec<NodeId>>,
    pub path_nodes: Option<Vec<NodeId>>,
}

impl Default for WeightedPathConfig {
    fn default() -> Self {
        Self {
            weight_property: String::new(),
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

impl WeightedPathConfig {
    fn weight_property(&self) -> Option<&str> {
        if self.weight_property.is_empty() {
            None
        } else {
            Some(&self.weight_property)
        }
    }
}

// The cost relaxation converges on its own; the cap only protects the
// u16 iteration tags from reaching the UNVISITED sentinel.
const MAX_COST_ITERATIONS: u16 = u16::MAX - 1;

/// Per-vertex tentative path costs, `+∞` until reached.
pub struct Costs {
    arrays: TableAtomicArrays<f64>,
}

impl Costs {
    pub fn new(max_offsets: &TableMap<Offset>) -> Self {
        Self {
            arrays: TableAtomicArrays::new(max_offsets, f64::MAX),
        }
    }

    pub fn pin(&self, table: TableId) {
        self.arrays.pin(table);
    }

    pub fn value(&self, offset: Offset) -> f64 {
        self.arrays.get(offset)
    }

    pub fn pair(&self) -> TableArrayPair<'_, f64> {
        TableArrayPair::new(&self.arrays)
    }
}

fn relax(costs: &TableArrayPair<'_, f64>, bound: Offset, nbr: Offset, weight: f64) -> bool {
    let new_cost = costs.cur_get(bound) + weight;
    let mut observed = costs.next_get(nbr);
    while new_cost < observed {
        match costs.next_compare_exchange(nbr, observed, new_cost) {
            Ok(_) => return true,
            Err(actual) => observed = actual,
        }
    }
    false
}

#[derive(Clone)]
struct WspDestinationsEdgeCompute<'a> {
    costs: &'a TableArrayPair<'a, f64>,
}

impl EdgeCompute for WspDestinationsEdgeCompute<'_> {
    fn begin_frontier_compute(&mut self, from: TableId, to: TableId) {
        self.costs.pin_cur(from);
        self.costs.pin_next(to);
    }

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        _fwd: bool,
        active: &mut Vec<NodeId>,
    ) {
        chunk.for_each_weighted(|nbr, _, weight| {
            if relax(self.costs, bound.offset, nbr.offset, weight) {
                active.push(nbr);
            }
        });
    }
}

struct WspPathsEdgeCompute<'a> {
    frontier_pair: &'a FrontierPair,
    bfs_graph: &'a BfsGraph,
    block: Arc<ObjectBlock>,
    single_parent: bool,
}

impl<'a> WspPathsEdgeCompute<'a> {
    fn new(frontier_pair: &'a FrontierPair, bfs_graph: &'a BfsGraph, single_parent: bool) -> Self {
        Self {
            frontier_pair,
            bfs_graph,
            block: bfs_graph.add_new_block(),
            single_parent,
        }
    }
}

impl Clone for WspPathsEdgeCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.frontier_pair, self.bfs_graph, self.single_parent)
    }
}

impl EdgeCompute for WspPathsEdgeCompute<'_> {
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
        chunk.for_each_weighted(|nbr, edge, weight| {
            if !self.block.has_space() {
                self.block = self.bfs_graph.add_new_block();
            }
            let iter = self.frontier_pair.current_iter();
            let added = if self.single_parent {
                self.bfs_graph.try_add_single_parent_with_weight(
                    iter,
                    bound,
                    edge,
                    nbr,
                    fwd,
                    weight,
                    &self.block,
                )
            } else {
                self.bfs_graph.try_add_parent_with_weight(
                    iter,
                    bound,
                    edge,
                    nbr,
                    fwd,
                    weight,
                    &self.block,
                )
            };
            if added {
                active.push(nbr);
            }
        });
    }
}

/// Emits `(src, dst, cost)` per reached destination.
struct WspDestinationsWriter<'a> {
    source: NodeId,
    costs: &'a Costs,
    output_mask: &'a NodeMask,
    pool: &'a TablePool<CostRow>,
    local: Vec<CostRow>,
}

impl<'a> WspDestinationsWriter<'a> {
    fn new(
        source: NodeId,
        costs: &'a Costs,
        output_mask: &'a NodeMask,
        pool: &'a TablePool<CostRow>,
    ) -> Self {
        let local = pool.claim_local();
        Self {
            source,
            costs,
            output_mask,
            pool,
            local,
        }
    }
}

impl Clone for WspDestinationsWriter<'_> {
    fn clone(&self) -> Self {
        Self::new(self.source, self.costs, self.output_mask, self.pool)
    }
}

impl VertexCompute for WspDestinationsWriter<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.costs.pin(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            let dst = NodeId::new(offset, table);
            let cost = self.costs.value(offset);
            if dst == self.source || cost == f64::MAX || !self.output_mask.contains(dst) {
                continue;
            }
            self.local.push(CostRow {
                src: self.source,
                dst,
                cost,
            });
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}

fn new_cost_frontier_pair(ctx: &ExecContext, max_offsets: TableMap<Offset>) -> Arc<FrontierPair> {
    // Costs can drop repeatedly, so vertices re-enter the frontier and
    // the pair needs two masks.
    let cur = Arc::new(PathLengths::new(&max_offsets));
    let next = Arc::new(PathLengths::new(&max_offsets));
    Arc::new(FrontierPair::double(
        cur,
        next,
        max_offsets,
        ctx.thread_count(),
    ))
}

/// Cheapest path cost from `source` to every reached vertex. Requires
/// non-negative weights.
pub fn wsp_destinations<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: WeightedPathConfig,
) -> Result<Vec<CostRow>> {
    let max_offsets = graph.max_offset_map();
    let output_mask = config
        .output_nodes
        .as_ref()
        .map(|nodes| NodeMask::from_nodes(&max_offsets, nodes))
        .unwrap_or_else(NodeMask::disabled);
    let costs = Costs::new(&max_offsets);
    let pair = costs.pair();
    pair.pin_next(source.table);
    pair.next_set(source.offset, 0.0);

    let frontier_pair = new_cost_frontier_pair(ctx, max_offsets);
    frontier_pair.init_source(source);

    let mut state = GdsComputeState::new(
        Arc::clone(&frontier_pair),
        WspDestinationsEdgeCompute { costs: &pair },
    );
    state.weight_property = config.weight_property().map(str::to_owned);
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, MAX_COST_ITERATIONS)?;

    let pool = TablePool::new();
    let mut writer = WspDestinationsWriter::new(source, &costs, &output_mask, &pool);
    run_vertex_compute(ctx, graph, &mut writer)?;
    Ok(pool.merge_local_tables())
}

fn weighted_paths<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: &WeightedPathConfig,
    single_parent: bool,
) -> Result<Vec<PathRow>> {
    let max_offsets = graph.max_offset_map();
    let output_mask = config
        .output_nodes
        .as_ref()
        .map(|nodes| NodeMask::from_nodes(&max_offsets, nodes))
        .unwrap_or_else(NodeMask::disabled);
    let path_node_mask = config
        .path_nodes
        .as_ref()
        .map(|nodes| NodeMask::from_nodes(&max_offsets, nodes))
        .unwrap_or_else(NodeMask::disabled);

    let bfs_graph = BfsGraph::new(&max_offsets);
    let source_block = bfs_graph.add_new_block();
    bfs_graph.init_source(source, &source_block);

    let frontier_pair = new_cost_frontier_pair(ctx, max_offsets);
    frontier_pair.init_source(source);

    let edge_compute = WspPathsEdgeCompute::new(&frontier_pair, &bfs_graph, single_parent);
    let mut state = GdsComputeState::new(Arc::clone(&frontier_pair), edge_compute);
    state.weight_property = config.weight_property().map(str::to_owned);
    run_frontiers_until_convergence(ctx, &mut state, graph, config.direction, MAX_COST_ITERATIONS)?;

    let info = PathWriterInfo {
        lower_bound: 1,
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
        PathsMode::Weighted,
        false,
        &output_mask,
        &path_node_mask,
        &counter,
        &pool,
    );
    run_vertex_compute(ctx, graph, &mut writer)?;
    Ok(pool.merge_local_tables())
}

/// One cheapest path per reached destination, with its total cost.
/// Requires non-negative weights.
pub fn wsp_paths<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: WeightedPathConfig,
) -> Result<Vec<PathRow>> {
    weighted_paths(ctx, graph, source, &config, true)
}

/// Every cheapest path per reached destination, with its total cost.
/// Requires non-negative weights.
pub fn awsp_paths<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    source: NodeId,
    config: WeightedPathConfig,
) -> Result<Vec<PathRow>> {
    weighted_paths(ctx, graph, source, &config, false)
}
