//! Parallel task runner and the frontier driver loop.
//!
//! One logical task is executed by `thread_count` workers spawned inside
//! a [`rayon::scope`]; every worker owns an independent clone of the
//! compute value and repeatedly claims range morsels until the
//! dispatcher is drained. The first error a worker hits is parked in a
//! shared slot and short-circuits the remaining workers; the interrupt
//! flag is observed between morsels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use parking_lot::Mutex;

use crate::compute::{EdgeCompute, RangeCompute, VertexCompute};
use crate::context::ExecContext;
use crate::frontier::{FrontierPair, MorselDispatcher};
use crate::graph::{Graph, NbrChunk, RelTableInfo};
use crate::mask::NodeMask;
use crate::types::{Direction, NodeId, Offset, TableId};
use crate::{Error, Result};

/// The wired-together state one frontier-driven algorithm runs on.
pub struct GdsComputeState<E: EdgeCompute> {
    pub frontier_pair: Arc<FrontierPair>,
    pub edge_compute: E,
    /// Edge property scanned as weight, when the algorithm needs one.
    pub weight_property: Option<String>,
    /// Vertices the caller wants output for; enables early termination.
    pub output_mask: Option<Arc<NodeMask>>,
}

impl<E: EdgeCompute> GdsComputeState<E> {
    pub fn new(frontier_pair: Arc<FrontierPair>, edge_compute: E) -> Self {
        Self {
            frontier_pair,
            edge_compute,
            weight_property: None,
            output_mask: None,
        }
    }

    pub fn with_weight_property(mut self, property: impl Into<String>) -> Self {
        self.weight_property = Some(property.into());
        self
    }

    pub fn with_output_mask(mut self, mask: Arc<NodeMask>) -> Self {
        self.output_mask = Some(mask);
        self
    }
}

struct ErrorSlot {
    failed: AtomicBool,
    first: Mutex<Option<Error>>,
}

impl ErrorSlot {
    fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            first: Mutex::new(None),
        }
    }

    fn set(&self, error: Error) {
        let mut slot = self.first.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.failed.store(true, Ordering::Relaxed);
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn into_result(self) -> Result<()> {
        match self.first.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Runs the frontier iterations of one algorithm until convergence or
/// the iteration cap. Per iteration, every relationship table is
/// extended in the requested direction; the per-table pins happen right
/// before each extension step.
pub fn run_frontiers_until_convergence<G, E>(
    ctx: &ExecContext,
    state: &mut GdsComputeState<E>,
    graph: &G,
    direction: Direction,
    max_iters: u16,
) -> Result<()>
where
    G: Graph + ?Sized,
    E: EdgeCompute,
{
    assert!(max_iters < u16::MAX, "iteration cap would hit the UNVISITED sentinel");
    let rel_infos = graph.rel_table_infos();
    while state.frontier_pair.continue_next_iter(max_iters) {
        ctx.check_interrupted()?;
        state.frontier_pair.begin_new_iteration();
        if let Some(mask) = state.output_mask.clone() {
            if mask.enabled() && state.edge_compute.terminate(&mask) {
                break;
            }
        }
        let start = Instant::now();
        for info in &rel_infos {
            match direction {
                Direction::Fwd => extend(ctx, state, graph, info, true)?,
                Direction::Bwd => extend(ctx, state, graph, info, false)?,
                Direction::Both => {
                    extend(ctx, state, graph, info, true)?;
                    extend(ctx, state, graph, info, false)?;
                }
            }
        }
        debug!(
            "iteration {} took {:?}",
            state.frontier_pair.current_iter(),
            start.elapsed()
        );
    }
    Ok(())
}

fn extend<G, E>(
    ctx: &ExecContext,
    state: &mut GdsComputeState<E>,
    graph: &G,
    info: &RelTableInfo,
    fwd: bool,
) -> Result<()>
where
    G: Graph + ?Sized,
    E: EdgeCompute,
{
    let (from, to) = if fwd {
        (info.from_table, info.to_table)
    } else {
        (info.to_table, info.from_table)
    };
    state.frontier_pair.begin_frontier_compute(from, to);
    state.edge_compute.begin_frontier_compute(from, to);
    run_frontier_task(
        ctx,
        &state.frontier_pair,
        &state.edge_compute,
        graph,
        info,
        fwd,
        state.weight_property.as_deref(),
    )
}

fn run_frontier_task<G, E>(
    ctx: &ExecContext,
    frontier_pair: &FrontierPair,
    edge_compute: &E,
    graph: &G,
    info: &RelTableInfo,
    fwd: bool,
    weight: Option<&str>,
) -> Result<()>
where
    G: Graph + ?Sized,
    E: EdgeCompute,
{
    let error = ErrorSlot::new();
    let locals: Vec<E> = (0..ctx.thread_count())
        .map(|_| edge_compute.clone())
        .collect();

    rayon::scope(|scope| {
        for mut local in locals {
            let error = &error;
            scope.spawn(move |_| {
                let mut scan = match graph.prepare_rel_scan(info.rel_table, weight) {
                    Ok(scan) => scan,
                    Err(e) => return error.set(e),
                };
                let mut active = Vec::new();
                while let Some(morsel) = frontier_pair.next_morsel() {
                    if error.is_failed() {
                        return;
                    }
                    if ctx.is_interrupted() {
                        return error.set(Error::Interrupted);
                    }
                    let mut activated = 0;
                    for offset in morsel.begin..morsel.end {
                        if !frontier_pair.is_active(offset) {
                            continue;
                        }
                        let bound = NodeId::new(offset, morsel.table);
                        {
                            let callback = &mut |chunk: &NbrChunk<'_>| {
                                local.edge_compute(bound, chunk, fwd, &mut active)
                            };
                            if fwd {
                                graph.scan_fwd(bound, &mut scan, callback);
                            } else {
                                graph.scan_bwd(bound, &mut scan, callback);
                            }
                        }
                        for nbr in active.drain(..) {
                            frontier_pair.activate_next(nbr.offset);
                            activated += 1;
                        }
                    }
                    frontier_pair.note_active(activated);
                }
            });
        }
    });

    error.into_result()
}

/// Runs a vertex compute over every node table of the graph.
pub fn run_vertex_compute<G, V>(ctx: &ExecContext, graph: &G, compute: &mut V) -> Result<()>
where
    G: Graph + ?Sized,
    V: VertexCompute,
{
    for table in graph.node_table_ids() {
        run_vertex_compute_on_table(ctx, graph, table, compute)?;
    }
    Ok(())
}

/// Runs a vertex compute over one node table's offset range. Every
/// worker clone gets a `finish` call after its last morsel, where result
/// writers flush their local output partitions.
pub fn run_vertex_compute_on_table<G, V>(
    ctx: &ExecContext,
    graph: &G,
    table: TableId,
    compute: &mut V,
) -> Result<()>
where
    G: Graph + ?Sized,
    V: VertexCompute,
{
    if !compute.begin_table(table) {
        return Ok(());
    }
    let dispatcher = MorselDispatcher::new(ctx.thread_count());
    dispatcher.init(table, graph.max_offset(table));

    let error = ErrorSlot::new();
    let locals: Vec<V> = (0..ctx.thread_count()).map(|_| compute.clone()).collect();
    rayon::scope(|scope| {
        for mut local in locals {
            let error = &error;
            let dispatcher = &dispatcher;
            scope.spawn(move |_| {
                while let Some(morsel) = dispatcher.next_morsel() {
                    if error.is_failed() {
                        break;
                    }
                    if ctx.is_interrupted() {
                        error.set(Error::Interrupted);
                        break;
                    }
                    local.vertex_compute(morsel.begin, morsel.end, morsel.table);
                }
                local.finish();
            });
        }
    });
    error.into_result()
}

/// Runs a range compute over `0..count` of a table-less in-memory graph.
pub fn run_range_compute<R>(ctx: &ExecContext, count: Offset, compute: &mut R) -> Result<()>
where
    R: RangeCompute,
{
    let dispatcher = MorselDispatcher::new(ctx.thread_count());
    dispatcher.init(0, count);
    run_morsels(ctx, &dispatcher, compute, |local, morsel| {
        local.range_compute(morsel.begin, morsel.end)
    })
}

fn run_morsels<C, F>(
    ctx: &ExecContext,
    dispatcher: &MorselDispatcher,
    compute: &mut C,
    run: F,
) -> Result<()>
where
    C: Clone + Send,
    F: Fn(&mut C, crate::frontier::FrontierMorsel) + Sync,
{
    let error = ErrorSlot::new();
    let locals: Vec<C> = (0..ctx.thread_count()).map(|_| compute.clone()).collect();
    let run = &run;

    rayon::scope(|scope| {
        for mut local in locals {
            let error = &error;
            scope.spawn(move |_| {
                while let Some(morsel) = dispatcher.next_morsel() {
                    if error.is_failed() {
                        return;
                    }
                    if ctx.is_interrupted() {
                        return error.set(Error::Interrupted);
                    }
                    run(&mut local, morsel);
                }
            });
        }
    });

    error.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::{PathLengths, UNVISITED};
    use crate::mem_graph::MemoryGraphBuilder;

    #[derive(Clone)]
    struct BfsEdgeCompute<'a> {
        frontier_pair: &'a FrontierPair,
    }

    impl EdgeCompute for BfsEdgeCompute<'_> {
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
    }

    fn frontier_state(
        ctx: &ExecContext,
        graph: &impl Graph,
        source: NodeId,
    ) -> (Arc<FrontierPair>, Arc<PathLengths>) {
        let max_offsets = graph.max_offset_map();
        let lengths = Arc::new(PathLengths::new(&max_offsets));
        let frontier_pair = Arc::new(FrontierPair::single(
            Arc::clone(&lengths),
            max_offsets,
            ctx.thread_count(),
        ));
        frontier_pair.init_source(source);
        (frontier_pair, lengths)
    }

    #[test]
    fn driver_records_bfs_levels() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(5);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)]);
        let graph = builder.build();

        let ctx = ExecContext::new(2);
        let (frontier_pair, lengths) = frontier_state(&ctx, &graph, NodeId::new(0, nodes));
        let mut state = GdsComputeState::new(
            Arc::clone(&frontier_pair),
            BfsEdgeCompute {
                frontier_pair: &frontier_pair,
            },
        );
        run_frontiers_until_convergence(&ctx, &mut state, &graph, Direction::Fwd, 10).unwrap();

        let levels = lengths.table(nodes);
        assert_eq!(levels.get(0), 0);
        assert_eq!(levels.get(1), 1);
        assert_eq!(levels.get(2), 1);
        assert_eq!(levels.get(3), 2);
        assert_eq!(levels.get(4), 3);
    }

    #[test]
    fn interrupt_aborts_the_driver() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 3)]);
        let graph = builder.build();

        let ctx = ExecContext::new(2);
        ctx.interrupt_flag().store(true, Ordering::Relaxed);

        let (frontier_pair, _) = frontier_state(&ctx, &graph, NodeId::new(0, nodes));
        let mut state = GdsComputeState::new(
            Arc::clone(&frontier_pair),
            BfsEdgeCompute {
                frontier_pair: &frontier_pair,
            },
        );
        let result = run_frontiers_until_convergence(&ctx, &mut state, &graph, Direction::Fwd, 10);
        assert!(matches!(result, Err(Error::Interrupted)));
    }
}
