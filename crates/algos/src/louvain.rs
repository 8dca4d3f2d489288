//! Louvain community detection.
//!
//! For nodes grouped into communities `C`, modularity is
//! `sumIntraWeights / 2m - (sumWeightedDegrees / 2m)^2`, where
//! `sumIntraWeights` counts intra-community edges in both directions
//! and `sumWeightedDegrees` sums the squared community degrees. Each
//! iteration greedily moves nodes into the neighbor community with the
//! best modularity gain; each phase collapses the accepted communities
//! into supernodes of a fresh in-memory graph and repeats until the
//! community count stops shrinking.
//!
//! Iterations are parallel vertex sweeps over the in-memory CSR; the
//! new assignments are order-sensitive the way concurrent Louvain
//! implementations are, with two stabilizers: a near-tie prefers the
//! smaller community id, and two singleton communities never swap into
//! each other.

use std::sync::atomic::Ordering;

use ahash::AHashMap;
use atomic_float::AtomicF64;
use log::debug;

use gds_engine::prelude::*;

const THRESHOLD: f64 = 1e-6;
const UNASSIGNED_COMM: Offset = Offset::MAX;
const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

#[derive(Clone, Copy, Debug)]
pub struct LouvainConfig {
    pub max_phases: u16,
    pub max_iterations: u16,
    /// Minimum modularity improvement an iteration must deliver for its
    /// moves to be committed.
    pub tolerance: f64,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            max_phases: Self::DEFAULT_MAX_PHASES,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            tolerance: Self::DEFAULT_TOLERANCE,
        }
    }
}

impl LouvainConfig {
    pub const DEFAULT_MAX_PHASES: u16 = 20;
    pub const DEFAULT_MAX_ITERATIONS: u16 = 20;
    pub const DEFAULT_TOLERANCE: f64 = 1e-12;
}

/// One `(nodeID, louvain_id)` output tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunityRow {
    pub node: NodeId,
    pub louvain_id: i64,
}

/// Size and weighted degree of one community. Deltas are accumulated
/// with wrapping arithmetic, so the size field may transiently hold a
/// negative delta in two's complement.
struct CommInfo {
    size: std::sync::atomic::AtomicU64,
    degree: AtomicF64,
}

impl CommInfo {
    fn zero() -> Self {
        Self {
            size: std::sync::atomic::AtomicU64::new(0),
            degree: AtomicF64::new(0.0),
        }
    }

    fn reset(&self) {
        self.size.store(0, Ordering::Relaxed);
        self.degree.store(0.0, Ordering::Relaxed);
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn degree(&self) -> f64 {
        self.degree.load(Ordering::Relaxed)
    }
}

struct PhaseState {
    graph: CsrGraph,
    /// Latest assignments that improved the modularity.
    accepted_comm: AtomicArray<u64>,
    /// Assignments whose modularity is being tested this iteration.
    curr_comm: AtomicArray<u64>,
    /// In-progress assignments produced by the current iteration.
    next_comm: AtomicArray<u64>,
    curr_comm_infos: Vec<CommInfo>,
    next_comm_infos: Vec<CommInfo>,
    node_weighted_degrees: Vec<AtomicF64>,
    self_comm_weights: Vec<AtomicF64>,
    /// 2 * sum of edge weights.
    total_weight: f64,
    /// 1 / total_weight.
    modularity_constant: f64,
}

impl PhaseState {
    fn new(node_count: Offset) -> Self {
        let mut state = Self {
            graph: CsrGraph::new(node_count),
            accepted_comm: AtomicArray::new(0, 0),
            curr_comm: AtomicArray::new(0, 0),
            next_comm: AtomicArray::new(0, 0),
            curr_comm_infos: Vec::new(),
            next_comm_infos: Vec::new(),
            node_weighted_degrees: Vec::new(),
            self_comm_weights: Vec::new(),
            total_weight: 0.0,
            modularity_constant: 0.0,
        };
        state.reinit(node_count);
        state
    }

    /// Prepares the per-node state for a phase over `node_count`
    /// (super)nodes.
    fn reinit(&mut self, node_count: Offset) {
        self.total_weight = 0.0;
        self.graph.reset(node_count);
        self.accepted_comm = AtomicArray::new(node_count, UNASSIGNED_COMM);
        self.curr_comm = AtomicArray::new(node_count, UNASSIGNED_COMM);
        self.next_comm = AtomicArray::new(node_count, UNASSIGNED_COMM);
        let count = node_count as usize;
        self.curr_comm_infos = (0..count).map(|_| CommInfo::zero()).collect();
        self.next_comm_infos = (0..count).map(|_| CommInfo::zero()).collect();
        self.node_weighted_degrees = (0..count).map(|_| AtomicF64::new(0.0)).collect();
        self.self_comm_weights = (0..count).map(|_| AtomicF64::new(0.0)).collect();
    }

    /// Registers the next node in offset order; every node starts as
    /// the single member of its own community.
    fn init_next_node(&mut self, node: Offset) {
        self.graph.init_next_node();
        self.curr_comm_infos[node as usize]
            .size
            .store(1, Ordering::Relaxed);
        self.curr_comm_infos[node as usize]
            .degree
            .store(0.0, Ordering::Relaxed);
        self.accepted_comm.set(node, node);
        self.curr_comm.set(node, node);
    }

    /// Adds a neighbor of the last registered node. Undirected edges
    /// are inserted once per direction by the builders below.
    fn insert_nbr(&mut self, from: Offset, to: Offset, weight: f64) {
        self.graph.insert_nbr(to, weight);
        self.node_weighted_degrees[from as usize].fetch_add(weight, Ordering::Relaxed);
        self.curr_comm_infos[from as usize]
            .degree
            .fetch_add(weight, Ordering::Relaxed);
        self.total_weight += weight;
    }

    fn finalize(&mut self) {
        self.graph.finish();
    }

    fn node_count(&self) -> Offset {
        self.graph.node_count()
    }

    fn start_new_iter(&mut self, ctx: &ExecContext) -> Result<()> {
        self.modularity_constant = 1.0 / self.total_weight;
        let node_count = self.node_count();
        let mut reset = StartNewIterCompute { state: self };
        run_range_compute(ctx, node_count, &mut reset)
    }
}

#[derive(Clone)]
struct StartNewIterCompute<'a> {
    state: &'a PhaseState,
}

impl RangeCompute for StartNewIterCompute<'_> {
    fn range_compute(&mut self, start: Offset, end: Offset) {
        for node in start..end {
            self.state.self_comm_weights[node as usize].store(0.0, Ordering::Relaxed);
            self.state.next_comm_infos[node as usize].reset();
        }
    }
}

/// The per-iteration gain evaluator.
#[derive(Clone)]
struct RunIterationCompute<'a> {
    state: &'a PhaseState,
    // Edge weight into the current community (index 0) and into each
    // neighboring community.
    intra_comm_weights: Vec<f64>,
    comm_to_index: AHashMap<Offset, usize>,
}

impl<'a> RunIterationCompute<'a> {
    fn new(state: &'a PhaseState) -> Self {
        Self {
            state,
            intra_comm_weights: Vec::new(),
            comm_to_index: AHashMap::new(),
        }
    }

    /// Accumulates the edge weights from `node` into each neighboring
    /// community; returns the self-loop weight, which moves with the
    /// node and cancels out of the gain.
    fn compute_intra_comm_weights(&mut self, node: Offset) -> f64 {
        let state = self.state;
        let mut self_loop_weight = 0.0;
        let curr_comm = state.curr_comm.get(node);
        self.comm_to_index.insert(curr_comm, 0);
        self.intra_comm_weights.push(0.0);
        for edge in state.graph.neighbors(node) {
            if edge.nbr == node {
                self_loop_weight += edge.weight;
            }
            let nbr_comm = state.curr_comm.get(edge.nbr);
            match self.comm_to_index.get(&nbr_comm) {
                Some(&index) => self.intra_comm_weights[index] += edge.weight,
                None => {
                    self.comm_to_index
                        .insert(nbr_comm, self.intra_comm_weights.len());
                    self.intra_comm_weights.push(edge.weight);
                }
            }
        }
        self_loop_weight
    }

    /// Picks the community that maximizes the modularity gain, in the
    /// `x2m` form that drops the shared `1/2m` factor.
    fn find_potential_new_comm(&self, node: Offset, self_loop_weight: f64) -> Offset {
        let state = self.state;
        let curr_comm = state.curr_comm.get(node);
        let degree = state.node_weighted_degrees[node as usize].load(Ordering::Relaxed);
        let mut new_comm = curr_comm;
        let mut new_comm_gain = 0.0;
        let prev_intra = self.intra_comm_weights[0] - self_loop_weight;
        let prev_degrees = state.curr_comm_infos[curr_comm as usize].degree() - degree;
        for (&nbr_comm, &index) in &self.comm_to_index {
            if nbr_comm == curr_comm {
                continue;
            }
            let new_intra = self.intra_comm_weights[index];
            let new_degrees = state.curr_comm_infos[nbr_comm as usize].degree();
            let change_intra = 2.0 * (new_intra - prev_intra);
            let change_degrees =
                2.0 * degree * state.modularity_constant * (new_degrees - prev_degrees);
            let gain = change_intra - change_degrees;
            if gain > new_comm_gain
                || ((new_comm_gain - gain) < THRESHOLD && gain > 0.0 && nbr_comm < new_comm)
            {
                new_comm_gain = gain;
                new_comm = nbr_comm;
            }
        }
        // Swap protection: two singleton communities would otherwise
        // trade places forever.
        if state.curr_comm_infos[new_comm as usize].size() == 1
            && state.curr_comm_infos[curr_comm as usize].size() == 1
            && new_comm > curr_comm
        {
            new_comm = curr_comm;
        }
        new_comm
    }
}

impl RangeCompute for RunIterationCompute<'_> {
    fn range_compute(&mut self, start: Offset, end: Offset) {
        let state = self.state;
        for node in start..end {
            let mut target = UNASSIGNED_COMM;
            if !state.graph.neighbors(node).is_empty() {
                self.comm_to_index.clear();
                self.intra_comm_weights.clear();
                let self_loop_weight = self.compute_intra_comm_weights(node);
                target = self.find_potential_new_comm(node, self_loop_weight);
                state.self_comm_weights[node as usize]
                    .store(self.intra_comm_weights[0], Ordering::Relaxed);
            }
            state.next_comm.set(node, target);

            let curr = state.curr_comm.get(node);
            if target != curr && target != UNASSIGNED_COMM {
                let degree = state.node_weighted_degrees[node as usize].load(Ordering::Relaxed);
                state.next_comm_infos[target as usize]
                    .degree
                    .fetch_add(degree, Ordering::Relaxed);
                state.next_comm_infos[target as usize]
                    .size
                    .fetch_add(1, Ordering::Relaxed);
                state.next_comm_infos[curr as usize]
                    .degree
                    .fetch_sub(degree, Ordering::Relaxed);
                state.next_comm_infos[curr as usize]
                    .size
                    .fetch_sub(1, Ordering::Relaxed);
            }
        }
    }
}

/// Modularity of the assignments *before* this iteration's moves, which
/// keeps the intra-weight bookkeeping simple.
#[derive(Clone)]
struct ComputeModularityCompute<'a> {
    state: &'a PhaseState,
    sum_intra_weights: &'a AtomicF64,
    sum_degree_squares: &'a AtomicF64,
}

impl RangeCompute for ComputeModularityCompute<'_> {
    fn range_compute(&mut self, start: Offset, end: Offset) {
        let mut intra = 0.0;
        let mut squares = 0.0;
        for node in start..end {
            intra += self.state.self_comm_weights[node as usize].load(Ordering::Relaxed);
            let degree = self.state.curr_comm_infos[node as usize].degree();
            squares += degree * degree;
        }
        self.sum_intra_weights.fetch_add(intra, Ordering::Relaxed);
        self.sum_degree_squares.fetch_add(squares, Ordering::Relaxed);
    }
}

/// Folds the accepted deltas into the current community infos.
#[derive(Clone)]
struct UpdateCommInfosCompute<'a> {
    state: &'a PhaseState,
}

impl RangeCompute for UpdateCommInfosCompute<'_> {
    fn range_compute(&mut self, start: Offset, end: Offset) {
        for comm in start..end {
            let delta = &self.state.next_comm_infos[comm as usize];
            let info = &self.state.curr_comm_infos[comm as usize];
            info.size.fetch_add(delta.size(), Ordering::Relaxed);
            info.degree.fetch_add(delta.degree(), Ordering::Relaxed);
        }
    }
}

/// Folds this phase's renumbered assignments into the original-node
/// results; every community of the previous phase is a node of this
/// one.
#[derive(Clone)]
struct SaveCommAssignmentsCompute<'a> {
    first_phase: bool,
    final_results: &'a AtomicArray<u64>,
    state: &'a PhaseState,
}

impl RangeCompute for SaveCommAssignmentsCompute<'_> {
    fn range_compute(&mut self, start: Offset, end: Offset) {
        for node in start..end {
            if self.first_phase {
                self.final_results.set(node, self.state.accepted_comm.get(node));
            } else {
                let prev = self.final_results.get(node);
                if prev == UNASSIGNED_COMM {
                    continue;
                }
                self.final_results.set(node, self.state.accepted_comm.get(prev));
            }
        }
    }
}

/// Builds the phase-0 CSR from the storage graph. Both scan directions
/// are inserted so the in-memory graph is undirected; the backward scan
/// skips self-loops the forward scan already delivered.
fn init_in_memory_graph<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    table: TableId,
    rel_table: TableId,
    node_count: Offset,
    state: &mut PhaseState,
) -> Result<()> {
    let mut scan = graph.prepare_rel_scan(rel_table, None)?;
    let mut nbrs: Vec<Offset> = Vec::new();
    for node in 0..node_count {
        ctx.check_interrupted()?;
        state.init_next_node(node);
        let node_id = NodeId::new(node, table);
        nbrs.clear();
        graph.scan_fwd(node_id, &mut scan, &mut |chunk| {
            chunk.for_each(|nbr, _| nbrs.push(nbr.offset));
        });
        graph.scan_bwd(node_id, &mut scan, &mut |chunk| {
            chunk.for_each(|nbr, _| {
                if nbr.offset != node {
                    nbrs.push(nbr.offset);
                }
            });
        });
        for i in 0..nbrs.len() {
            state.insert_nbr(node, nbrs[i], DEFAULT_EDGE_WEIGHT);
        }
    }
    state.finalize();
    Ok(())
}

/// Sequentially renumbers the accepted communities to a dense `0..n`
/// range, skipping isolated nodes; returns the community count.
fn renumber_communities(state: &mut PhaseState) -> Offset {
    let mut remap: AHashMap<Offset, Offset> = AHashMap::new();
    let mut next_comm = 0;
    for node in 0..state.node_count() {
        let comm = state.accepted_comm.get(node);
        if comm == UNASSIGNED_COMM {
            continue;
        }
        let renumbered = *remap.entry(comm).or_insert_with(|| {
            let id = next_comm;
            next_comm += 1;
            id
        });
        state.accepted_comm.set(node, renumbered);
    }
    next_comm
}

/// Sequentially merges each community into a supernode and rebuilds the
/// CSR with summed inter-community edge weights.
fn aggregate_communities(state: &mut PhaseState, new_comm_count: Offset) {
    let mut comm_weights: Vec<AHashMap<Offset, f64>> =
        (0..new_comm_count).map(|_| AHashMap::new()).collect();
    for node in 0..state.node_count() {
        let comm = state.accepted_comm.get(node);
        for edge in state.graph.neighbors(node) {
            let nbr_comm = state.accepted_comm.get(edge.nbr);
            if comm >= nbr_comm {
                *comm_weights[comm as usize].entry(nbr_comm).or_insert(0.0) += edge.weight;
                if comm != nbr_comm {
                    *comm_weights[nbr_comm as usize].entry(comm).or_insert(0.0) += edge.weight;
                }
            }
        }
    }
    state.reinit(new_comm_count);
    for node in 0..new_comm_count {
        state.init_next_node(node);
        let weights = std::mem::take(&mut comm_weights[node as usize]);
        for (nbr, weight) in weights {
            state.insert_nbr(node, nbr, weight);
        }
    }
    state.finalize();
}

struct CommunityOutputCompute<'a> {
    final_results: &'a AtomicArray<u64>,
    pool: &'a TablePool<CommunityRow>,
    local: Vec<CommunityRow>,
}

impl<'a> CommunityOutputCompute<'a> {
    fn new(final_results: &'a AtomicArray<u64>, pool: &'a TablePool<CommunityRow>) -> Self {
        let local = pool.claim_local();
        Self {
            final_results,
            pool,
            local,
        }
    }
}

impl Clone for CommunityOutputCompute<'_> {
    fn clone(&self) -> Self {
        Self::new(self.final_results, self.pool)
    }
}

impl VertexCompute for CommunityOutputCompute<'_> {
    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            self.local.push(CommunityRow {
                node: NodeId::new(offset, table),
                louvain_id: self.final_results.get(offset) as i64,
            });
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}

/// Runs Louvain and returns one `(nodeID, louvain_id)` row per node.
/// Requires a graph with exactly one node table and one relationship
/// table; isolated nodes keep the unassigned sentinel.
pub fn louvain<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: LouvainConfig,
) -> Result<Vec<CommunityRow>> {
    let node_tables = graph.node_table_ids();
    let rel_infos = graph.rel_table_infos();
    if node_tables.len() != 1 {
        return Err(Error::Runtime(
            "Louvain only supports operations on one node table".to_owned(),
        ));
    }
    if rel_infos.len() != 1 {
        return Err(Error::Runtime(
            "Louvain only supports operations on one rel table".to_owned(),
        ));
    }
    let table = node_tables[0];
    let orig_node_count = graph.max_offset(table);
    let total_steps = config.max_phases as f64 * config.max_iterations as f64;

    let final_results = AtomicArray::new(orig_node_count, UNASSIGNED_COMM);
    let mut state = PhaseState::new(orig_node_count);
    init_in_memory_graph(
        ctx,
        graph,
        table,
        rel_infos[0].rel_table,
        orig_node_count,
        &mut state,
    )?;

    // Each phase merges nodes into supernodes; each iteration inside a
    // phase moves nodes between communities while modularity improves.
    for phase in 0..config.max_phases {
        let mut old_modularity = -1.0;
        for iteration in 0..config.max_iterations {
            ctx.check_interrupted()?;
            state.start_new_iter(ctx)?;

            let mut run_iteration = RunIterationCompute::new(&state);
            run_range_compute(ctx, state.node_count(), &mut run_iteration)?;

            let sum_intra_weights = AtomicF64::new(0.0);
            let sum_degree_squares = AtomicF64::new(0.0);
            let mut modularity = ComputeModularityCompute {
                state: &state,
                sum_intra_weights: &sum_intra_weights,
                sum_degree_squares: &sum_degree_squares,
            };
            run_range_compute(ctx, state.node_count(), &mut modularity)?;
            let k = state.modularity_constant;
            let curr_modularity = sum_intra_weights.load(Ordering::Relaxed) * k
                - sum_degree_squares.load(Ordering::Relaxed) * k * k;

            if curr_modularity - old_modularity < config.tolerance {
                // This iteration's moves stay uncommitted; the accepted
                // assignments are final for the phase.
                break;
            }
            old_modularity = curr_modularity;
            debug!(
                "phase {phase} iteration {iteration}: modularity {curr_modularity:.6}"
            );

            let mut update_infos = UpdateCommInfosCompute { state: &state };
            run_range_compute(ctx, state.node_count(), &mut update_infos)?;
            std::mem::swap(&mut state.accepted_comm, &mut state.curr_comm);
            std::mem::swap(&mut state.curr_comm, &mut state.next_comm);

            let step = phase as f64 * config.max_iterations as f64 + iteration as f64 + 1.0;
            ctx.update_progress(step / total_steps);
        }

        let old_comm_count = state.node_count();
        let new_comm_count = renumber_communities(&mut state);
        let mut save = SaveCommAssignmentsCompute {
            first_phase: phase == 0,
            final_results: &final_results,
            state: &state,
        };
        run_range_compute(ctx, orig_node_count, &mut save)?;

        if old_comm_count == new_comm_count {
            break;
        }
        aggregate_communities(&mut state, new_comm_count);
    }

    let pool = TablePool::new();
    let mut output = CommunityOutputCompute::new(&final_results, &pool);
    run_vertex_compute(ctx, graph, &mut output)?;
    Ok(pool.merge_local_tables())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn community_of(rows: &[CommunityRow], offset: Offset) -> i64 {
        rows.iter()
            .find(|row| row.node.offset == offset)
            .unwrap()
            .louvain_id
    }

    #[test]
    fn two_triangles_with_one_bridge() {
        // Triangles {0,1,2} and {3,4,5} linked by (2,3).
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(6);
        builder.add_rel_table(
            nodes,
            nodes,
            vec![(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 3)],
        );
        let graph = builder.build();

        let rows = louvain(&ExecContext::new(1), &graph, LouvainConfig::default()).unwrap();
        assert_eq!(rows.len(), 6);

        let left = community_of(&rows, 0);
        assert_eq!(community_of(&rows, 1), left);
        assert_eq!(community_of(&rows, 2), left);
        let right = community_of(&rows, 3);
        assert_eq!(community_of(&rows, 4), right);
        assert_eq!(community_of(&rows, 5), right);
        assert_ne!(left, right);
    }

    #[test]
    fn final_partition_beats_singletons() {
        // Modularity of the found partition on the bridged triangles
        // exceeds 0.35; singletons score 0.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(6);
        builder.add_rel_table(
            nodes,
            nodes,
            vec![(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 3)],
        );
        let graph = builder.build();
        let rows = louvain(&ExecContext::new(1), &graph, LouvainConfig::default()).unwrap();

        let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 3)];
        let m = edges.len() as f64;
        let comm = |n: Offset| community_of(&rows, n);
        let intra = edges
            .iter()
            .filter(|&&(a, b)| comm(a) == comm(b))
            .count() as f64;
        let mut degree = [0.0f64; 6];
        for &(a, b) in &edges {
            degree[a as usize] += 1.0;
            degree[b as usize] += 1.0;
        }
        let mut degree_sums = std::collections::HashMap::new();
        for node in 0..6u64 {
            *degree_sums.entry(comm(node)).or_insert(0.0) += degree[node as usize];
        }
        let modularity = intra / m
            - degree_sums
                .values()
                .map(|&d: &f64| (d / (2.0 * m)).powi(2))
                .sum::<f64>();
        assert!(modularity > 0.35, "modularity was {modularity}");
    }

    #[test]
    fn isolated_nodes_stay_unassigned() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(3);
        builder.add_rel_table(nodes, nodes, vec![(0, 1)]);
        let graph = builder.build();

        let rows = louvain(&ExecContext::new(1), &graph, LouvainConfig::default()).unwrap();
        assert_eq!(community_of(&rows, 0), community_of(&rows, 1));
        assert_eq!(community_of(&rows, 2), UNASSIGNED_COMM as i64);
    }

    #[test]
    fn rejects_multi_table_graphs() {
        let mut builder = MemoryGraphBuilder::new();
        let a = builder.add_node_table(2);
        let b = builder.add_node_table(2);
        builder.add_rel_table(a, b, vec![(0, 0)]);
        let graph = builder.build();

        let result = louvain(&ExecContext::new(1), &graph, LouvainConfig::default());
        assert!(matches!(result, Err(Error::Runtime(_))));
    }
}
