//! Append-only CSR for multi-pass algorithms.
//!
//! Louvain and the aggregation between its phases build their own
//! in-memory adjacency rather than re-scanning storage every iteration.
//! Nodes are inserted strictly in offset order: `init_next_node` seals
//! the previous node's edge run, `insert_nbr` appends to the current
//! one, `finish` seals the last. Undirected edges must be inserted in
//! both directions by the caller.

use crate::types::Offset;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CsrEdge {
    pub nbr: Offset,
    pub weight: f64,
}

/// After `finish`: `offsets.len() == node_count + 1`, `offsets` is
/// non-decreasing and `offsets[node_count] == edges.len()`.
pub struct CsrGraph {
    pub offsets: Vec<Offset>,
    pub edges: Vec<CsrEdge>,
    node_count: Offset,
    inserted: Offset,
}

impl CsrGraph {
    pub fn new(node_count: Offset) -> Self {
        let mut graph = Self {
            offsets: Vec::new(),
            edges: Vec::new(),
            node_count: 0,
            inserted: 0,
        };
        graph.reset(node_count);
        graph
    }

    /// Resets to an empty graph of `node_count` nodes, reusing the
    /// allocations. Phases only shrink the node count, so capacity is
    /// reused across the whole invocation.
    pub fn reset(&mut self, node_count: Offset) {
        self.offsets.clear();
        self.edges.clear();
        self.offsets.reserve(node_count as usize + 1);
        self.node_count = node_count;
        self.inserted = 0;
    }

    pub fn node_count(&self) -> Offset {
        self.node_count
    }

    pub fn edge_count(&self) -> Offset {
        self.edges.len() as Offset
    }

    pub fn init_next_node(&mut self) {
        debug_assert!(self.inserted < self.node_count);
        self.offsets.push(self.edges.len() as Offset);
        self.inserted += 1;
    }

    pub fn insert_nbr(&mut self, nbr: Offset, weight: f64) {
        debug_assert!(!self.offsets.is_empty(), "insert_nbr before init_next_node");
        self.edges.push(CsrEdge { nbr, weight });
    }

    /// Seals the last node's edge run.
    pub fn finish(&mut self) {
        debug_assert_eq!(self.inserted, self.node_count);
        self.offsets.push(self.edges.len() as Offset);
    }

    pub fn neighbors(&self, node: Offset) -> &[CsrEdge] {
        let begin = self.offsets[node as usize] as usize;
        let end = self.offsets[node as usize + 1] as usize;
        &self.edges[begin..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_invariants_hold() {
        let mut graph = CsrGraph::new(3);
        graph.init_next_node();
        graph.insert_nbr(1, 1.0);
        graph.insert_nbr(2, 2.0);
        graph.init_next_node();
        graph.insert_nbr(0, 1.0);
        graph.init_next_node();
        graph.insert_nbr(0, 2.0);
        graph.finish();

        assert_eq!(graph.offsets, vec![0, 2, 3, 4]);
        assert!(graph.offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.neighbors(0).len(), 2);
        assert_eq!(graph.neighbors(2), &[CsrEdge { nbr: 0, weight: 2.0 }]);
    }

    #[test]
    fn reset_reuses_for_fewer_nodes() {
        let mut graph = CsrGraph::new(4);
        for _ in 0..4 {
            graph.init_next_node();
        }
        graph.finish();

        graph.reset(2);
        graph.init_next_node();
        graph.insert_nbr(1, 1.0);
        graph.init_next_node();
        graph.insert_nbr(0, 1.0);
        graph.finish();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.offsets, vec![0, 1, 2]);
    }
}
