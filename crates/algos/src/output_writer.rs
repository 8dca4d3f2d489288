//! Result writers for the recursive-join family.
//!
//! Writers run as vertex computes over the destination node tables after
//! the driver finished. Each worker clone appends rows to a local output
//! partition; the partitions are merged by the caller.
//!
//! The paths writer enumerates paths by a backtracking depth-first walk
//! over the parent chains recorded in the
//! [`BfsGraph`](gds_engine::bfs_graph::BfsGraph). For unweighted
//! searches the iteration tags decrease by exactly one per hop, which
//! both guides the descent and makes the stack depth equal the path
//! length. For weighted searches every chain entry is an equal-cost
//! minimum parent and the walk terminates at the cost-0 source anchor.

use std::sync::atomic::{AtomicU64, Ordering};

use gds_engine::prelude::*;

/// One `(src, dst, length)` output tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LengthRow {
    pub src: NodeId,
    pub dst: NodeId,
    pub length: i64,
}

/// One `(src, dst, cost)` output tuple of a weighted destinations run.
#[derive(Clone, Debug, PartialEq)]
pub struct CostRow {
    pub src: NodeId,
    pub dst: NodeId,
    pub cost: f64,
}

/// One path output tuple. `path_nodes` holds the intermediate nodes
/// only; `path_edges` has one entry per hop and `directions` mirrors it
/// when direction output is requested. `cost` is set by the weighted
/// variants.
#[derive(Clone, Debug, PartialEq)]
pub struct PathRow {
    pub src: NodeId,
    pub dst: NodeId,
    pub length: i64,
    pub directions: Option<Vec<bool>>,
    pub path_nodes: Vec<NodeId>,
    pub path_edges: Vec<RelId>,
    pub cost: Option<f64>,
}

/// Which repetitions a path may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathSemantic {
    /// No constraint.
    Walk,
    /// No edge repeats along the path.
    Trail,
    /// No node repeats along the path.
    Acyclic,
}

#[derive(Clone, Copy, Debug)]
pub struct PathWriterInfo {
    pub lower_bound: u16,
    pub semantic: PathSemantic,
    /// The search ran from the query's source; false flips the emitted
    /// node and edge order so results still read source-to-destination.
    pub extend_from_source: bool,
    pub write_direction: bool,
    pub limit: Option<u64>,
}

impl Default for PathWriterInfo {
    fn default() -> Self {
        Self {
            lower_bound: 1,
            semantic: PathSemantic::Walk,
            extend_from_source: true,
            write_direction: false,
            limit: None,
        }
    }
}

/// Emits `(src, dst, length)` per reached destination, skipping the
/// source itself and unreached vertices.
pub struct DestinationsWriter<'a> {
    source: NodeId,
    path_lengths: &'a PathLengths,
    output_mask: &'a NodeMask,
    pool: &'a TablePool<LengthRow>,
    local: Vec<LengthRow>,
}

impl<'a> DestinationsWriter<'a> {
    pub fn new(
        source: NodeId,
        path_lengths: &'a PathLengths,
        output_mask: &'a NodeMask,
        pool: &'a TablePool<LengthRow>,
    ) -> Self {
        let local = pool.claim_local();
        Self {
            source,
            path_lengths,
            output_mask,
            pool,
            local,
        }
    }
}

impl Clone for DestinationsWriter<'_> {
    fn clone(&self) -> Self {
        Self::new(self.source, self.path_lengths, self.output_mask, self.pool)
    }
}

impl VertexCompute for DestinationsWriter<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.path_lengths.pin_cur(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            let dst = NodeId::new(offset, table);
            let length = self.path_lengths.cur_value(offset);
            if dst == self.source || length == UNVISITED || !self.output_mask.contains(dst) {
                continue;
            }
            self.local.push(LengthRow {
                src: self.source,
                dst,
                length: length as i64,
            });
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}

/// How the parent chains were recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathsMode {
    /// Iteration-tagged chains from an unweighted search.
    Unweighted,
    /// Cost-carrying chains from a weighted search.
    Weighted,
}

#[derive(Clone, Copy)]
enum ChainRule {
    /// Any alternative of the destination's own chain long enough to
    /// clear the lower bound.
    Bottom,
    /// Parents discovered exactly one iteration earlier.
    Exact(u16),
    /// Any equal-cost minimum parent.
    Any,
}

/// Enumerates paths into [`PathRow`]s. Covers single/all shortest
/// paths, the weighted variants and variable-length joins; the variable
/// length flavor relaxes the skip rules and may emit the empty path.
pub struct PathsWriter<'a> {
    source: NodeId,
    bfs_graph: &'a BfsGraph,
    info: PathWriterInfo,
    mode: PathsMode,
    var_len: bool,
    output_mask: &'a NodeMask,
    path_node_mask: &'a NodeMask,
    counter: &'a AtomicU64,
    pool: &'a TablePool<PathRow>,
    local: Vec<PathRow>,
}

impl<'a> PathsWriter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: NodeId,
        bfs_graph: &'a BfsGraph,
        info: PathWriterInfo,
        mode: PathsMode,
        var_len: bool,
        output_mask: &'a NodeMask,
        path_node_mask: &'a NodeMask,
        counter: &'a AtomicU64,
        pool: &'a TablePool<PathRow>,
    ) -> Self {
        let local = pool.claim_local();
        Self {
            source,
            bfs_graph,
            info,
            mode,
            var_len,
            output_mask,
            path_node_mask,
            counter,
            pool,
            local,
        }
    }

    fn limit_reached(&self) -> bool {
        self.info
            .limit
            .map_or(false, |limit| self.counter.load(Ordering::Relaxed) >= limit)
    }

    fn skip(&self, dst: NodeId) -> bool {
        if !self.output_mask.contains(dst) {
            return true;
        }
        let head = self.bfs_graph.head(dst.offset);
        if self.var_len {
            match head {
                None => self.info.lower_bound > 0 || dst != self.source,
                Some(head) => head.iter() < self.info.lower_bound.max(1),
            }
        } else {
            dst == self.source || head.is_none()
        }
    }

    fn bottom_rule(&self) -> ChainRule {
        match self.mode {
            PathsMode::Unweighted => ChainRule::Bottom,
            PathsMode::Weighted => ChainRule::Any,
        }
    }

    fn matches_rule(&self, candidate: &ParentList, rule: ChainRule) -> bool {
        match rule {
            ChainRule::Bottom => candidate.iter() >= self.info.lower_bound.max(1),
            ChainRule::Exact(iter) => candidate.iter() == iter,
            ChainRule::Any => true,
        }
    }

    fn viable(&self, candidate: &ParentList, stack: &[&ParentList], dst: NodeId) -> bool {
        let node = candidate.node();
        let reaches_source = match self.mode {
            PathsMode::Unweighted => candidate.iter() == 1,
            PathsMode::Weighted => node == self.source,
        };
        // The mask constrains intermediate path nodes, not the endpoints.
        if !reaches_source && !self.path_node_mask.contains(node) {
            return false;
        }
        match self.info.semantic {
            PathSemantic::Walk => true,
            PathSemantic::Trail => {
                let edge = candidate.edge();
                !stack.iter().any(|p| p.edge() == edge)
            }
            PathSemantic::Acyclic => node != dst && !stack.iter().any(|p| p.node() == node),
        }
    }

    fn first_viable(
        &self,
        mut chain: Option<&'a ParentList>,
        rule: ChainRule,
        stack: &[&'a ParentList],
        dst: NodeId,
    ) -> Option<&'a ParentList> {
        while let Some(candidate) = chain {
            if self.matches_rule(candidate, rule) && self.viable(candidate, stack, dst) {
                return Some(candidate);
            }
            chain = candidate.next();
        }
        None
    }

    /// Pops until some popped entry has a viable untried alternative,
    /// which becomes the new stack top. False once the stack drains.
    fn backtrack(&self, stack: &mut Vec<&'a ParentList>, dst: NodeId) -> bool {
        while let Some(top) = stack.pop() {
            let rule = match (self.mode, stack.last()) {
                (PathsMode::Weighted, _) => ChainRule::Any,
                (PathsMode::Unweighted, Some(below)) => ChainRule::Exact(below.iter() - 1),
                (PathsMode::Unweighted, None) => self.bottom_rule(),
            };
            if let Some(alt) = self.first_viable(top.next(), rule, stack, dst) {
                stack.push(alt);
                return true;
            }
        }
        false
    }

    fn emit(&mut self, stack: &[&ParentList], dst: NodeId, cost: Option<f64>) {
        // stack[0] is the record of dst; stack[len - 1] is the hop out
        // of the source. Intermediate nodes are the parents of all but
        // the last hop.
        let hops = stack.len();
        let mut path_nodes = Vec::with_capacity(hops.saturating_sub(1));
        let mut path_edges = Vec::with_capacity(hops);
        let mut directions = self.info.write_direction.then(|| Vec::with_capacity(hops));
        if self.info.extend_from_source {
            for record in stack.iter().rev() {
                path_edges.push(record.edge());
                if let Some(dirs) = directions.as_mut() {
                    dirs.push(record.is_fwd());
                }
            }
            for record in stack[..hops - 1].iter().rev() {
                path_nodes.push(record.node());
            }
        } else {
            for record in stack.iter() {
                path_edges.push(record.edge());
                if let Some(dirs) = directions.as_mut() {
                    dirs.push(record.is_fwd());
                }
            }
            for record in &stack[..hops - 1] {
                path_nodes.push(record.node());
            }
        }
        let length = match self.mode {
            PathsMode::Unweighted => stack[0].iter() as i64,
            PathsMode::Weighted => hops as i64,
        };
        self.local.push(PathRow {
            src: self.source,
            dst,
            length,
            directions,
            path_nodes,
            path_edges,
            cost,
        });
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    fn write_for_dst(&mut self, dst: NodeId) {
        let Some(head) = self.bfs_graph.head(dst.offset) else {
            // Variable-length join with lower bound 0: the empty path
            // from the source to itself.
            self.local.push(PathRow {
                src: self.source,
                dst,
                length: 0,
                directions: self.info.write_direction.then(Vec::new),
                path_nodes: Vec::new(),
                path_edges: Vec::new(),
                cost: None,
            });
            self.counter.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let cost = match self.mode {
            PathsMode::Weighted => Some(head.cost()),
            PathsMode::Unweighted => None,
        };

        let mut stack: Vec<&ParentList> = Vec::new();
        match self.first_viable(Some(head), self.bottom_rule(), &stack, dst) {
            Some(first) => stack.push(first),
            None => return,
        }
        while !stack.is_empty() {
            if self.limit_reached() {
                return;
            }
            let top = *stack.last().unwrap();
            let complete = match self.mode {
                PathsMode::Unweighted => top.iter() == 1,
                PathsMode::Weighted => top.node() == self.source,
            };
            if complete {
                self.emit(&stack, dst, cost);
                if !self.backtrack(&mut stack, dst) {
                    return;
                }
                continue;
            }
            let rule = match self.mode {
                PathsMode::Unweighted => ChainRule::Exact(top.iter() - 1),
                PathsMode::Weighted => ChainRule::Any,
            };
            let chain = self.bfs_graph.head_of(top.node());
            match self.first_viable(chain, rule, &stack, dst) {
                Some(child) => stack.push(child),
                None => {
                    if !self.backtrack(&mut stack, dst) {
                        return;
                    }
                }
            }
        }
    }
}

impl Clone for PathsWriter<'_> {
    fn clone(&self) -> Self {
        Self::new(
            self.source,
            self.bfs_graph,
            self.info,
            self.mode,
            self.var_len,
            self.output_mask,
            self.path_node_mask,
            self.counter,
            self.pool,
        )
    }
}

impl VertexCompute for PathsWriter<'_> {
    fn begin_table(&mut self, table: TableId) -> bool {
        self.bfs_graph.pin_table(table);
        true
    }

    fn vertex_compute(&mut self, start: Offset, end: Offset, table: TableId) {
        for offset in start..end {
            if self.limit_reached() {
                return;
            }
            let dst = NodeId::new(offset, table);
            if self.skip(dst) {
                continue;
            }
            self.write_for_dst(dst);
        }
    }

    fn finish(&mut self) {
        self.pool.return_local(std::mem::take(&mut self.local));
    }
}
