//! PageRank over the graph handle.
//!
//! Pull-based iteration: every vertex recomputes its score from the
//! out-scores of its in-neighbors, then republishes its own out-score.
//! Workers claim range morsels per node table; the per-iteration L1
//! error decides convergence against the tolerance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use atomic_float::AtomicF64;
use log::info;

use gds_engine::prelude::*;

use crate::degrees::{compute_degrees, Degrees};

#[derive(Clone, Copy, Debug)]
pub struct PageRankConfig {
    pub max_iterations: usize,
    /// The computation stops once the sum of score deltas per iteration
    /// drops below this.
    pub tolerance: f64,
    /// Probability that the imagined random surfer keeps clicking.
    pub damping_factor: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-4,
            damping_factor: 0.85,
        }
    }
}

/// One `(nodeID, rank)` output tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct RankRow {
    pub node: NodeId,
    pub rank: f64,
}

/// Runs PageRank; returns the rank rows, the number of iterations ran
/// and the final error.
pub fn page_rank<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: PageRankConfig,
) -> Result<(Vec<RankRow>, usize, f64)> {
    let start = Instant::now();
    let max_offsets = graph.max_offset_map();
    let node_count = graph.total_node_count();
    if node_count == 0 {
        return Ok((Vec::new(), 0, 0.0));
    }
    let init_score = 1.0 / node_count as f64;
    let base_score = (1.0 - config.damping_factor) / node_count as f64;

    let out_degrees = Degrees::new(&max_offsets);
    compute_degrees(ctx, graph, &out_degrees, Direction::Fwd)?;

    let scores = TableAtomicArrays::new(&max_offsets, init_score);
    let out_scores = TableAtomicArrays::new(&max_offsets, 0.0);
    for (&table, &len) in &max_offsets {
        out_degrees.pin(table);
        let array = out_scores.array(table);
        for offset in 0..len {
            let degree = out_degrees.value(offset);
            if degree > 0 {
                array.set(offset, init_score / degree as f64);
            }
        }
    }

    // One scan per relationship table that points into each node table.
    let rel_infos = graph.rel_table_infos();
    let mut scans_per_table: TableMap<Vec<ScanState>> = TableMap::default();
    for &table in max_offsets.keys() {
        let scans = rel_infos
            .iter()
            .filter(|info| info.to_table == table)
            .map(|info| graph.prepare_rel_scan(info.rel_table, None))
            .collect::<Result<Vec<_>>>()?;
        scans_per_table.insert(table, scans);
    }

    let mut iteration = 0;
    let mut error;
    loop {
        let iter_start = Instant::now();
        error = page_rank_iteration(
            ctx,
            graph,
            &max_offsets,
            &scans_per_table,
            &out_degrees,
            &scores,
            &out_scores,
            base_score,
            config.damping_factor,
        )?;
        iteration += 1;
        info!(
            "finished iteration {} with an error of {:.6} in {:?}",
            iteration,
            error,
            iter_start.elapsed()
        );
        ctx.update_progress(iteration as f64 / config.max_iterations as f64);
        if error < config.tolerance || iteration == config.max_iterations {
            break;
        }
    }
    info!("computed PageRank in {:?}", start.elapsed());

    let mut rows = Vec::with_capacity(node_count as usize);
    for (&table, &len) in &max_offsets {
        let array = scores.array(table);
        for offset in 0..len {
            rows.push(RankRow {
                node: NodeId::new(offset, table),
                rank: array.get(offset),
            });
        }
    }
    Ok((rows, iteration, error))
}

#[allow(clippy::too_many_arguments)]
fn page_rank_iteration<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    max_offsets: &TableMap<Offset>,
    scans_per_table: &TableMap<Vec<ScanState>>,
    out_degrees: &Degrees,
    scores: &TableAtomicArrays<f64>,
    out_scores: &TableAtomicArrays<f64>,
    base_score: f64,
    damping_factor: f64,
) -> Result<f64> {
    let total_error = AtomicF64::new(0.0);
    let interrupted = AtomicBool::new(false);

    for (&table, &len) in max_offsets {
        out_degrees.pin(table);
        let dispatcher = MorselDispatcher::new(ctx.thread_count());
        dispatcher.init(table, len);
        let table_scans = &scans_per_table[&table];

        rayon::scope(|scope| {
            for _ in 0..ctx.thread_count() {
                let dispatcher = &dispatcher;
                let total_error = &total_error;
                let interrupted = &interrupted;
                scope.spawn(move |_| {
                    let mut scans = table_scans.to_vec();
                    let mut local_error = 0.0;
                    while let Some(morsel) = dispatcher.next_morsel() {
                        if ctx.is_interrupted() {
                            interrupted.store(true, Ordering::Relaxed);
                            break;
                        }
                        for offset in morsel.begin..morsel.end {
                            let node = NodeId::new(offset, morsel.table);
                            let mut incoming_total = 0.0;
                            for scan in &mut scans {
                                graph.scan_bwd(node, scan, &mut |chunk: &NbrChunk<'_>| {
                                    chunk.for_each(|nbr, _| {
                                        incoming_total +=
                                            out_scores.array(nbr.table).get(nbr.offset);
                                    });
                                });
                            }
                            let score_array = scores.array(morsel.table);
                            let old_score = score_array.get(offset);
                            let new_score = base_score + damping_factor * incoming_total;
                            score_array.set(offset, new_score);
                            local_error += (new_score - old_score).abs();

                            let degree = out_degrees.value(offset);
                            let out = if degree > 0 {
                                new_score / degree as f64
                            } else {
                                0.0
                            };
                            out_scores.array(morsel.table).set(offset, out);
                        }
                    }
                    total_error.fetch_add(local_error, Ordering::Relaxed);
                });
            }
        });
    }

    if interrupted.load(Ordering::Relaxed) {
        return Err(Error::Interrupted);
    }
    Ok(total_error.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_on_a_cycle() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
        let graph = builder.build();

        let (rows, iterations, error) =
            page_rank(&ExecContext::new(2), &graph, PageRankConfig::default()).unwrap();
        assert!(iterations >= 1);
        assert!(error < PageRankConfig::default().tolerance);
        for row in &rows {
            assert!((row.rank - 0.25).abs() < 1e-6, "rank was {}", row.rank);
        }
    }

    #[test]
    fn sinks_rank_above_their_feeders() {
        // A star pointing at node 0.
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(4);
        builder.add_rel_table(nodes, nodes, vec![(1, 0), (2, 0), (3, 0)]);
        let graph = builder.build();

        let (rows, _, _) =
            page_rank(&ExecContext::new(2), &graph, PageRankConfig::default()).unwrap();
        let rank_of = |offset: Offset| {
            rows.iter()
                .find(|r| r.node.offset == offset)
                .unwrap()
                .rank
        };
        assert!(rank_of(0) > rank_of(1));
        assert!((rank_of(1) - rank_of(2)).abs() < 1e-12);
    }
}
