pub use crate::array::AtomicArray;
pub use crate::array::TableArrayPair;
pub use crate::array::TableAtomicArrays;

pub use crate::bfs_graph::BfsGraph;
pub use crate::bfs_graph::ObjectBlock;
pub use crate::bfs_graph::ParentList;

pub use crate::compute::EdgeCompute;
pub use crate::compute::RangeCompute;
pub use crate::compute::VertexCompute;

pub use crate::context::ExecContext;
pub use crate::context::Progress;

pub use crate::csr::CsrEdge;
pub use crate::csr::CsrGraph;

pub use crate::frontier::FrontierMorsel;
pub use crate::frontier::FrontierPair;
pub use crate::frontier::MorselDispatcher;
pub use crate::frontier::PathLengths;
pub use crate::frontier::UNVISITED;

pub use crate::graph::Graph;
pub use crate::graph::NbrChunk;
pub use crate::graph::RelTableInfo;
pub use crate::graph::ScanState;
pub use crate::graph::DEFAULT_WEIGHT;

pub use crate::mask::NodeMask;

pub use crate::mem_graph::MemoryGraph;
pub use crate::mem_graph::MemoryGraphBuilder;

pub use crate::runner::run_frontiers_until_convergence;
pub use crate::runner::run_range_compute;
pub use crate::runner::run_vertex_compute;
pub use crate::runner::run_vertex_compute_on_table;
pub use crate::runner::GdsComputeState;

pub use crate::table::TablePool;

pub use crate::types::Direction;
pub use crate::types::NodeId;
pub use crate::types::Offset;
pub use crate::types::RelId;
pub use crate::types::TableId;
pub use crate::types::TableMap;
pub use crate::types::INVALID_OFFSET;

pub use crate::Error;
pub use crate::Result;

pub use atomic::Atomic;
