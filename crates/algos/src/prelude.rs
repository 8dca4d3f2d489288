pub use crate::all_shortest_path::all_sp_destinations;
pub use crate::all_shortest_path::all_sp_paths;
pub use crate::all_shortest_path::Multiplicities;

pub use crate::component_ids::ComponentIds;
pub use crate::component_ids::ComponentIdsPair;
pub use crate::component_ids::ComponentRow;
pub use crate::component_ids::OffsetManager;
pub use crate::component_ids::INVALID_COMPONENT;

pub use crate::degrees::compute_degrees;
pub use crate::degrees::Degrees;
pub use crate::degrees::INVALID_DEGREE;

pub use crate::k_core::k_core;
pub use crate::k_core::CoreRow;
pub use crate::k_core::KCoreConfig;

pub use crate::louvain::louvain;
pub use crate::louvain::CommunityRow;
pub use crate::louvain::LouvainConfig;

pub use crate::output_writer::CostRow;
pub use crate::output_writer::LengthRow;
pub use crate::output_writer::PathRow;
pub use crate::output_writer::PathSemantic;
pub use crate::output_writer::PathWriterInfo;

pub use crate::page_rank::page_rank;
pub use crate::page_rank::PageRankConfig;
pub use crate::page_rank::RankRow;

pub use crate::scc::scc;
pub use crate::scc::SccConfig;
pub use crate::scc_kosaraju::scc_kosaraju;

pub use crate::shortest_path::single_sp_destinations;
pub use crate::shortest_path::single_sp_paths;
pub use crate::shortest_path::ShortestPathConfig;

pub use crate::spanning_forest::spanning_forest;
pub use crate::spanning_forest::DisjointSet;
pub use crate::spanning_forest::ForestEdgeRow;
pub use crate::spanning_forest::ForestVariant;
pub use crate::spanning_forest::SpanningForestConfig;

pub use crate::var_len::var_len_joins;
pub use crate::var_len::VarLenConfig;

pub use crate::wcc::wcc;
pub use crate::wcc::WccConfig;

pub use crate::weighted_shortest_path::awsp_paths;
pub use crate::weighted_shortest_path::wsp_destinations;
pub use crate::weighted_shortest_path::wsp_paths;
pub use crate::weighted_shortest_path::Costs;
pub use crate::weighted_shortest_path::WeightedPathConfig;
