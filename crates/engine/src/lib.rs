//! A framework for parallel, frontier-based graph algorithms over
//! multi-table property graphs.
//!
//! The engine advances a wavefront of active vertices across iterations
//! while dispatching work-stealing range morsels to a pool of
//! [rayon](https://github.com/rayon-rs/rayon) workers. Algorithms plug in
//! through two small contracts: an [`EdgeCompute`](compute::EdgeCompute)
//! that is invoked over neighbor chunks of active vertices and decides
//! which neighbors join the next frontier, and a
//! [`VertexCompute`](compute::VertexCompute) that sweeps offset ranges,
//! typically to seed state or to write results.
//!
//! The graph topology is consumed through the [`Graph`](graph::Graph)
//! trait, a thin contract over a storage engine: iterate node tables,
//! scan forward/backward neighbors of a node into chunks, and report the
//! maximum offset per table. [`MemoryGraph`](mem_graph::MemoryGraph)
//! provides an in-memory CSR implementation of that contract.
//!
//! Per-vertex algorithm state lives in per-table dense atomic arrays that
//! are pinned to a single table per extension step, so the inner loops
//! are plain offset-indexed loads and stores.

pub mod array;
pub mod bfs_graph;
pub mod compute;
pub mod context;
pub mod csr;
pub mod frontier;
pub mod graph;
pub mod mask;
pub mod mem_graph;
pub mod prelude;
pub mod runner;
pub mod table;
pub mod types;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A user-facing configuration problem: unknown option, bad bounds,
    /// missing or non-numeric weight property.
    #[error("bind error: {0}")]
    Binder(String),
    /// A schema-shape or invariant violation that aborts the invocation.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The execution context observed the interrupt flag.
    #[error("interrupted")]
    Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
