//! Compute contracts plugged into the runner.
//!
//! The runner materializes one clone per worker, so implementations keep
//! worker-local state (scratch vectors, a parent-record block) in plain
//! fields and share cross-worker state behind `Arc`s.

use crate::graph::NbrChunk;
use crate::mask::NodeMask;
use crate::types::{NodeId, Offset, TableId};

/// Invoked over the neighbor chunks of every vertex active in the
/// current frontier. Neighbors pushed into `active` join the next
/// frontier.
pub trait EdgeCompute: Clone + Send {
    /// Driver-side hook before an extension step between two tables;
    /// pins per-table state shared by the worker clones.
    fn begin_frontier_compute(&mut self, _from: TableId, _to: TableId) {}

    fn edge_compute(
        &mut self,
        bound: NodeId,
        chunk: &NbrChunk<'_>,
        fwd: bool,
        active: &mut Vec<NodeId>,
    );

    /// Consulted between iterations when an output mask is enabled;
    /// returning true stops the driver early.
    fn terminate(&mut self, _mask: &NodeMask) -> bool {
        false
    }
}

/// Invoked over offset ranges of whole node tables; used for seeding
/// state and for writing results.
pub trait VertexCompute: Clone + Send {
    /// Pins per-table state; returning false skips the table.
    fn begin_table(&mut self, _table: TableId) -> bool {
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId);

    /// Called once per worker clone after its last morsel; implementations
    /// flush worker-local output here.
    fn finish(&mut self) {}
}

/// Invoked over plain offset ranges of an in-memory graph that has no
/// table structure (Louvain phase state).
pub trait RangeCompute: Clone + Send {
    fn range_compute(&mut self, start: Offset, end: Offset);
}
