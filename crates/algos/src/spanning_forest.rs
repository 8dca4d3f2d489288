//! Spanning forest via Kruskal's algorithm.
//!
//! Edges are materialized once, sorted by weight (ascending for the
//! minimum variant, descending for the maximum variant, with the edge
//! identity as tie-break so runs are deterministic), then folded into a
//! disjoint set: an edge joins the forest iff its endpoints are still
//! in different components. Emitted edges are labeled with the final
//! component id of their source as `forest_id`.

use rayon::slice::ParallelSliceMut;

use gds_engine::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForestVariant {
    Min,
    Max,
}

#[derive(Clone, Debug)]
pub struct SpanningForestConfig {
    pub variant: ForestVariant,
    /// Numeric edge property read as weight; empty means unit weights.
    pub weight_property: String,
}

impl Default for SpanningForestConfig {
    fn default() -> Self {
        Self {
            variant: ForestVariant::Min,
            weight_property: String::new(),
        }
    }
}

/// One `(src, dst, rel, forest_id)` output tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForestEdgeRow {
    pub src: NodeId,
    pub dst: NodeId,
    pub rel: RelId,
    pub forest_id: u64,
}

/// Sequential union-find with path-halving and union by rank; equal
/// ranks attach under the smaller id, whose rank then grows.
pub struct DisjointSet {
    parents: Vec<Offset>,
    rank: Vec<u64>,
}

impl DisjointSet {
    pub fn new(size: Offset) -> Self {
        Self {
            parents: (0..size).collect(),
            rank: vec![0; size as usize],
        }
    }

    pub fn find(&mut self, node: Offset) -> Offset {
        let node = node as usize;
        while self.parents[node] != self.parents[self.parents[node] as usize] {
            self.parents[node] = self.parents[self.parents[node] as usize];
        }
        self.parents[node]
    }

    pub fn union(&mut self, left: Offset, right: Offset) {
        let left = self.find(left);
        let right = self.find(right);
        debug_assert_ne!(left, right);
        if self.rank[left as usize] == self.rank[right as usize] {
            let parent = left.min(right);
            let child = left.max(right);
            self.parents[child as usize] = parent;
            self.rank[parent as usize] += 1;
        } else if self.rank[left as usize] < self.rank[right as usize] {
            self.parents[left as usize] = right;
        } else {
            self.parents[right as usize] = left;
        }
    }
}

// (src, dst, rel offset, weight)
type WeightedEdge = (Offset, Offset, Offset, f64);

fn sort_edges(edges: &mut [WeightedEdge], variant: ForestVariant) {
    edges.par_sort_unstable_by(|a, b| {
        let key = |e: &WeightedEdge| (e.3, e.0, e.1, e.2);
        let (aw, a_src, a_dst, a_rel) = key(a);
        let (bw, b_src, b_dst, b_rel) = key(b);
        let ordering = aw
            .total_cmp(&bw)
            .then(a_src.cmp(&b_src))
            .then(a_dst.cmp(&b_dst))
            .then(a_rel.cmp(&b_rel));
        match variant {
            ForestVariant::Min => ordering,
            ForestVariant::Max => ordering.reverse(),
        }
    });
}

/// Computes a minimum or maximum spanning forest. Requires a graph with
/// exactly one node table and one relationship table.
pub fn spanning_forest<G: Graph + ?Sized>(
    ctx: &ExecContext,
    graph: &G,
    config: SpanningForestConfig,
) -> Result<Vec<ForestEdgeRow>> {
    let node_tables = graph.node_table_ids();
    let rel_infos = graph.rel_table_infos();
    if node_tables.len() != 1 {
        return Err(Error::Runtime(
            "spanning forest only supports operations on one node table".to_owned(),
        ));
    }
    if rel_infos.len() != 1 {
        return Err(Error::Runtime(
            "spanning forest only supports operations on one rel table".to_owned(),
        ));
    }
    let table = node_tables[0];
    let rel_info = rel_infos[0];
    let node_count = graph.max_offset(table);
    let weight = if config.weight_property.is_empty() {
        None
    } else {
        Some(config.weight_property.as_str())
    };

    let mut scan = graph.prepare_rel_scan(rel_info.rel_table, weight)?;
    let mut edges: Vec<WeightedEdge> = Vec::new();
    for offset in 0..node_count {
        ctx.check_interrupted()?;
        graph.scan_fwd(NodeId::new(offset, table), &mut scan, &mut |chunk| {
            chunk.for_each_weighted(|nbr, rel, weight| {
                if nbr.offset != offset {
                    edges.push((offset, nbr.offset, rel.offset, weight));
                }
            });
        });
    }

    sort_edges(&mut edges, config.variant);

    let mut components = DisjointSet::new(node_count);
    let mut forest: Vec<(Offset, Offset, Offset)> = Vec::new();
    for &(src, dst, rel, _) in &edges {
        if forest.len() as Offset == node_count.saturating_sub(1) {
            break;
        }
        let src_comp = components.find(src);
        let dst_comp = components.find(dst);
        if src_comp != dst_comp {
            forest.push((src, dst, rel));
            components.union(src_comp, dst_comp);
        }
    }

    Ok(forest
        .into_iter()
        .map(|(src, dst, rel)| ForestEdgeRow {
            src: NodeId::new(src, table),
            dst: NodeId::new(dst, table),
            rel: RelId::new(rel, rel_info.rel_table),
            forest_id: components.find(src),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_with_path_halving() {
        let mut set = DisjointSet::new(10);
        assert_eq!(set.find(9), 9);
        set.union(9, 7);
        set.union(7, 4);
        set.union(4, 2);
        assert_eq!(set.find(9), set.find(2));
        assert_ne!(set.find(9), set.find(3));
    }

    #[test]
    fn equal_ranks_attach_under_smaller_id() {
        let mut set = DisjointSet::new(4);
        set.union(2, 3);
        assert_eq!(set.find(3), 2);
        set.union(0, 1);
        assert_eq!(set.find(1), 0);
        set.union(2, 0);
        assert_eq!(set.find(3), 0);
    }

    #[test]
    fn min_forest_on_two_components() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(5);
        builder.add_rel_table_weighted(
            nodes,
            nodes,
            "weight",
            vec![(0, 1, 1.0), (1, 2, 2.0), (0, 2, 3.0), (3, 4, 1.0)],
        );
        let graph = builder.build();

        let config = SpanningForestConfig {
            weight_property: "weight".to_owned(),
            ..Default::default()
        };
        let rows = spanning_forest(&ExecContext::new(1), &graph, config).unwrap();

        let mut picked: Vec<_> = rows
            .iter()
            .map(|row| (row.src.offset, row.dst.offset))
            .collect();
        picked.sort_unstable();
        assert_eq!(picked, vec![(0, 1), (1, 2), (3, 4)]);

        // Forest ids partition {0, 1, 2} vs {3, 4}.
        let id_of = |src: Offset| {
            rows.iter()
                .find(|r| r.src.offset == src)
                .unwrap()
                .forest_id
        };
        assert_eq!(id_of(0), id_of(1));
        assert_ne!(id_of(0), id_of(3));
    }

    #[test]
    fn max_variant_prefers_heavy_edges() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(3);
        builder.add_rel_table_weighted(
            nodes,
            nodes,
            "weight",
            vec![(0, 1, 1.0), (1, 2, 2.0), (0, 2, 3.0)],
        );
        let graph = builder.build();

        let config = SpanningForestConfig {
            variant: ForestVariant::Max,
            weight_property: "weight".to_owned(),
        };
        let rows = spanning_forest(&ExecContext::new(1), &graph, config).unwrap();

        let mut picked: Vec<_> = rows
            .iter()
            .map(|row| (row.src.offset, row.dst.offset))
            .collect();
        picked.sort_unstable();
        assert_eq!(picked, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut builder = MemoryGraphBuilder::new();
        let nodes = builder.add_node_table(2);
        builder.add_rel_table(nodes, nodes, vec![(0, 0), (0, 1)]);
        let graph = builder.build();

        let rows =
            spanning_forest(&ExecContext::new(1), &graph, SpanningForestConfig::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].src.offset, rows[0].dst.offset), (0, 1));
    }
}
