//! In-memory multi-table property graph.
//!
//! A compressed-sparse-row implementation of the [`Graph`] contract,
//! holding forward and backward adjacency per relationship table plus
//! optional `f64` edge properties. It stands in for the storage engine
//! in tests and for embedders that materialize a graph up front.

use fxhash::FxHashMap;

use crate::graph::{Graph, NbrChunk, RelTableInfo, ScanState};
use crate::types::{NodeId, Offset, RelId, TableId, TableMap};
use crate::{Error, Result};

struct Adjacency {
    offsets: Vec<usize>,
    nbrs: Vec<NodeId>,
    rels: Vec<RelId>,
    weights: Option<Vec<f64>>,
}

impl Adjacency {
    fn build(
        node_count: Offset,
        rel_table: TableId,
        nbr_table: TableId,
        // (bound offset, neighbor offset, dense rel offset, weight)
        edges: &[(Offset, Offset, Offset, f64)],
        with_weights: bool,
    ) -> Self {
        let mut offsets = vec![0usize; node_count as usize + 1];
        for &(src, _, _, _) in edges {
            offsets[src as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let edge_count = edges.len();
        let mut cursor = offsets.clone();
        let mut nbrs = vec![NodeId::new(0, 0); edge_count];
        let mut rels = vec![RelId::new(0, 0); edge_count];
        let mut weights = if with_weights {
            Some(vec![0.0; edge_count])
        } else {
            None
        };
        for &(src, dst, rel, weight) in edges {
            let pos = cursor[src as usize];
            cursor[src as usize] += 1;
            nbrs[pos] = NodeId::new(dst, nbr_table);
            rels[pos] = RelId::new(rel, rel_table);
            if let Some(w) = weights.as_mut() {
                w[pos] = weight;
            }
        }
        Self {
            offsets,
            nbrs,
            rels,
            weights,
        }
    }

    fn chunk(&self, offset: Offset, with_weights: bool) -> NbrChunk<'_> {
        let begin = self.offsets[offset as usize];
        let end = self.offsets[offset as usize + 1];
        NbrChunk {
            nbrs: &self.nbrs[begin..end],
            rels: &self.rels[begin..end],
            weights: if with_weights {
                self.weights.as_ref().map(|w| &w[begin..end])
            } else {
                None
            },
        }
    }
}

struct RelTableData {
    info: RelTableInfo,
    weight_property: Option<String>,
    fwd: Adjacency,
    bwd: Adjacency,
}

pub struct MemoryGraph {
    node_tables: TableMap<Offset>,
    node_table_ids: Vec<TableId>,
    rel_tables: FxHashMap<TableId, RelTableData>,
    rel_infos: Vec<RelTableInfo>,
}

impl Graph for MemoryGraph {
    fn node_table_ids(&self) -> Vec<TableId> {
        self.node_table_ids.clone()
    }

    fn rel_table_infos(&self) -> Vec<RelTableInfo> {
        self.rel_infos.clone()
    }

    fn max_offset(&self, table: TableId) -> Offset {
        self.node_tables[&table]
    }

    fn prepare_rel_scan(&self, rel_table: TableId, weight: Option<&str>) -> Result<ScanState> {
        let data = self
            .rel_tables
            .get(&rel_table)
            .ok_or_else(|| Error::Runtime(format!("unknown rel table {rel_table}")))?;
        let with_weights = match weight {
            None => false,
            Some(name) => {
                if data.weight_property.as_deref() != Some(name) {
                    return Err(Error::Binder(format!(
                        "cannot find numeric property {name} on rel table {rel_table}"
                    )));
                }
                true
            }
        };
        Ok(ScanState {
            rel_table,
            with_weights,
        })
    }

    fn scan_fwd(&self, node: NodeId, state: &mut ScanState, f: &mut dyn FnMut(&NbrChunk<'_>)) {
        let data = &self.rel_tables[&state.rel_table];
        if node.table != data.info.from_table {
            return;
        }
        let chunk = data.fwd.chunk(node.offset, state.with_weights);
        if !chunk.is_empty() {
            f(&chunk);
        }
    }

    fn scan_bwd(&self, node: NodeId, state: &mut ScanState, f: &mut dyn FnMut(&NbrChunk<'_>)) {
        let data = &self.rel_tables[&state.rel_table];
        if node.table != data.info.to_table {
            return;
        }
        let chunk = data.bwd.chunk(node.offset, state.with_weights);
        if !chunk.is_empty() {
            f(&chunk);
        }
    }
}

struct RelSpec {
    table: TableId,
    from: TableId,
    to: TableId,
    weight_property: Option<String>,
    // (src, dst, weight)
    edges: Vec<(Offset, Offset, f64)>,
}

/// Builds a [`MemoryGraph`] from per-table edge lists. Node tables are
/// registered first; relationship tables reference them. Edges are
/// directed; algorithms that treat the graph as undirected extend in
/// both directions instead.
#[derive(Default)]
pub struct MemoryGraphBuilder {
    next_table_id: TableId,
    node_tables: Vec<(TableId, Offset)>,
    rel_specs: Vec<RelSpec>,
}

impl MemoryGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_table(&mut self, node_count: Offset) -> TableId {
        let table = self.next_table_id;
        self.next_table_id += 1;
        self.node_tables.push((table, node_count));
        table
    }

    pub fn add_rel_table(
        &mut self,
        from: TableId,
        to: TableId,
        edges: impl IntoIterator<Item = (Offset, Offset)>,
    ) -> TableId {
        let edges = edges
            .into_iter()
            .map(|(src, dst)| (src, dst, crate::graph::DEFAULT_WEIGHT))
            .collect();
        self.push_rel(from, to, None, edges)
    }

    pub fn add_rel_table_weighted(
        &mut self,
        from: TableId,
        to: TableId,
        weight_property: &str,
        edges: impl IntoIterator<Item = (Offset, Offset, f64)>,
    ) -> TableId {
        self.push_rel(
            from,
            to,
            Some(weight_property.to_owned()),
            edges.into_iter().collect(),
        )
    }

    fn push_rel(
        &mut self,
        from: TableId,
        to: TableId,
        weight_property: Option<String>,
        edges: Vec<(Offset, Offset, f64)>,
    ) -> TableId {
        let table = self.next_table_id;
        self.next_table_id += 1;
        self.rel_specs.push(RelSpec {
            table,
            from,
            to,
            weight_property,
            edges,
        });
        table
    }

    pub fn build(self) -> MemoryGraph {
        let node_tables: TableMap<Offset> = self.node_tables.iter().copied().collect();
        let node_table_ids = self.node_tables.iter().map(|&(t, _)| t).collect();

        let mut rel_tables = FxHashMap::default();
        let mut rel_infos = Vec::with_capacity(self.rel_specs.len());
        for spec in self.rel_specs {
            let info = RelTableInfo {
                from_table: spec.from,
                rel_table: spec.table,
                to_table: spec.to,
            };
            let with_weights = spec.weight_property.is_some();
            let fwd_edges: Vec<_> = spec
                .edges
                .iter()
                .enumerate()
                .map(|(rel, &(src, dst, w))| (src, dst, rel as Offset, w))
                .collect();
            let bwd_edges: Vec<_> = spec
                .edges
                .iter()
                .enumerate()
                .map(|(rel, &(src, dst, w))| (dst, src, rel as Offset, w))
                .collect();
            let fwd = Adjacency::build(
                node_tables[&spec.from],
                spec.table,
                spec.to,
                &fwd_edges,
                with_weights,
            );
            let bwd = Adjacency::build(
                node_tables[&spec.to],
                spec.table,
                spec.from,
                &bwd_edges,
                with_weights,
            );
            rel_infos.push(info);
            rel_tables.insert(
                spec.table,
                RelTableData {
                    info,
                    weight_property: spec.weight_property,
                    fwd,
                    bwd,
                },
            );
        }

        MemoryGraph {
            node_tables,
            node_table_ids,
            rel_tables,
            rel_infos,
        }
    }
}
