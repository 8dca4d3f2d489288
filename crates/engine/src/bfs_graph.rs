//! Lock-free parent-pointer graph for path reconstruction.
//!
//! During a BFS-like computation every worker records, per reached
//! vertex, the predecessor edges it arrived through. The records live in
//! bump-allocated blocks owned by the graph; publication happens by
//! compare-and-swap on a per-vertex head pointer, so readers never take a
//! lock. The block list only grows under a mutex when a worker runs out
//! of local space.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF64;
use parking_lot::Mutex;

use crate::types::{NodeId, Offset, RelId, TableId, TableMap};

const BLOCK_SIZE_BYTES: usize = 1 << 19;

/// One predecessor record: the iteration it was discovered at, the
/// parent vertex, the edge taken, the traversal direction, the
/// accumulated path cost for weighted searches and the link to the next
/// alternative parent.
pub struct ParentList {
    iter: AtomicU16,
    fwd: AtomicBool,
    node_offset: AtomicU64,
    node_table: AtomicU64,
    edge_offset: AtomicU64,
    edge_table: AtomicU64,
    cost: AtomicF64,
    next: AtomicPtr<ParentList>,
}

impl Default for ParentList {
    fn default() -> Self {
        Self {
            iter: AtomicU16::new(0),
            fwd: AtomicBool::new(true),
            node_offset: AtomicU64::new(0),
            node_table: AtomicU64::new(0),
            edge_offset: AtomicU64::new(0),
            edge_table: AtomicU64::new(0),
            cost: AtomicF64::new(0.0),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }
}

impl ParentList {
    fn store_parent(&self, iter: u16, node: NodeId, edge: RelId, fwd: bool) {
        self.iter.store(iter, Ordering::Relaxed);
        self.node_offset.store(node.offset, Ordering::Relaxed);
        self.node_table.store(node.table, Ordering::Relaxed);
        self.edge_offset.store(edge.offset, Ordering::Relaxed);
        self.edge_table.store(edge.table, Ordering::Relaxed);
        self.fwd.store(fwd, Ordering::Relaxed);
    }

    pub fn iter(&self) -> u16 {
        self.iter.load(Ordering::Relaxed)
    }

    pub fn node(&self) -> NodeId {
        NodeId::new(
            self.node_offset.load(Ordering::Relaxed),
            self.node_table.load(Ordering::Relaxed),
        )
    }

    pub fn edge(&self) -> RelId {
        RelId::new(
            self.edge_offset.load(Ordering::Relaxed),
            self.edge_table.load(Ordering::Relaxed),
        )
    }

    pub fn is_fwd(&self) -> bool {
        self.fwd.load(Ordering::Relaxed)
    }

    pub fn cost(&self) -> f64 {
        self.cost.load(Ordering::Relaxed)
    }

    fn set_cost(&self, cost: f64) {
        self.cost.store(cost, Ordering::Relaxed);
    }

    fn set_next(&self, ptr: *mut ParentList) {
        self.next.store(ptr, Ordering::Relaxed);
    }

    /// The next alternative parent of the same vertex.
    pub fn next(&self) -> Option<&ParentList> {
        unsafe { self.next.load(Ordering::Acquire).as_ref() }
    }

    fn as_ptr(&self) -> *mut ParentList {
        self as *const ParentList as *mut ParentList
    }
}

/// Pre-allocated span of parent records with a bump cursor. Each worker
/// reserves from its own block, so `revert_last` safely reclaims the slot
/// a lost CAS race left unpublished.
pub struct ObjectBlock {
    slots: Box<[ParentList]>,
    next_slot: AtomicUsize,
}

impl ObjectBlock {
    fn new() -> Self {
        let capacity = BLOCK_SIZE_BYTES / std::mem::size_of::<ParentList>();
        let slots = (0..capacity).map(|_| ParentList::default()).collect();
        Self {
            slots,
            next_slot: AtomicUsize::new(0),
        }
    }

    pub fn has_space(&self) -> bool {
        self.next_slot.load(Ordering::Relaxed) < self.slots.len()
    }

    fn reserve_next(&self) -> &ParentList {
        let pos = self.next_slot.fetch_add(1, Ordering::Relaxed);
        &self.slots[pos]
    }

    fn revert_last(&self) {
        self.next_slot.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Per-vertex predecessor chains for one source-centric computation.
///
/// `heads` holds one atomic head pointer per vertex of every node table;
/// chains thread through records owned by `blocks`. Records stay valid
/// until the graph is dropped, so parent references handed out borrow
/// from `self`.
pub struct BfsGraph {
    heads: TableMap<Box<[AtomicPtr<ParentList>]>>,
    pinned: AtomicPtr<AtomicPtr<ParentList>>,
    pinned_len: AtomicUsize,
    blocks: Mutex<Vec<Arc<ObjectBlock>>>,
}

// Raw head pointers only ever target records inside `blocks`, which live
// as long as the graph.
unsafe impl Send for BfsGraph {}
unsafe impl Sync for BfsGraph {}

impl BfsGraph {
    pub fn new(max_offsets: &TableMap<Offset>) -> Self {
        let heads = max_offsets
            .iter()
            .map(|(&table, &len)| {
                let ptrs = (0..len)
                    .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                    .collect();
                (table, ptrs)
            })
            .collect();
        Self {
            heads,
            pinned: AtomicPtr::new(std::ptr::null_mut()),
            pinned_len: AtomicUsize::new(0),
            blocks: Mutex::new(Vec::new()),
        }
    }

    /// Grabs a fresh block that the calling worker owns and writes to.
    pub fn add_new_block(&self) -> Arc<ObjectBlock> {
        let mut blocks = self.blocks.lock();
        let block = Arc::new(ObjectBlock::new());
        blocks.push(Arc::clone(&block));
        block
    }

    pub fn pin_table(&self, table: TableId) {
        let heads = &self.heads[&table];
        self.pinned
            .store(heads.as_ptr() as *mut AtomicPtr<ParentList>, Ordering::Relaxed);
        self.pinned_len.store(heads.len(), Ordering::Relaxed);
    }

    fn pinned_heads(&self) -> &[AtomicPtr<ParentList>] {
        let ptr = self.pinned.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "no node table pinned");
        unsafe { std::slice::from_raw_parts(ptr, self.pinned_len.load(Ordering::Relaxed)) }
    }

    /// Head of the parent chain of a vertex in the pinned table.
    pub fn head(&self, offset: Offset) -> Option<&ParentList> {
        unsafe {
            self.pinned_heads()[offset as usize]
                .load(Ordering::Acquire)
                .as_ref()
        }
    }

    /// Head of the parent chain of an arbitrary vertex, bypassing the pin.
    pub fn head_of(&self, node: NodeId) -> Option<&ParentList> {
        unsafe {
            self.heads[&node.table][node.offset as usize]
                .load(Ordering::Acquire)
                .as_ref()
        }
    }

    /// Publishes the cost-0 anchor record for the source of a weighted
    /// search. The writers identify the source by `cost() == 0`.
    pub fn init_source(&self, source: NodeId, block: &ObjectBlock) {
        let slot = block.reserve_next();
        slot.store_parent(0, source, RelId::new(0, 0), true);
        slot.set_cost(0.0);
        slot.set_next(std::ptr::null_mut());
        self.heads[&source.table][source.offset as usize]
            .store(slot.as_ptr(), Ordering::Release);
    }

    /// Records `bound` as one more parent of `nbr`, chaining in front of
    /// whatever parents other workers already published. Loops until the
    /// CAS wins.
    pub fn add_parent(
        &self,
        iter: u16,
        bound: NodeId,
        edge: RelId,
        nbr: NodeId,
        fwd: bool,
        block: &ObjectBlock,
    ) {
        let slot = block.reserve_next();
        slot.store_parent(iter, bound, edge, fwd);
        let head = &self.pinned_heads()[nbr.offset as usize];
        let mut expected = head.load(Ordering::Relaxed);
        loop {
            slot.set_next(expected);
            match head.compare_exchange(
                expected,
                slot.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => expected = actual,
            }
        }
    }

    /// Records `bound` as the parent of `nbr` only if `nbr` has none yet;
    /// the losing worker rolls its reservation back. Returns whether the
    /// record was published.
    pub fn add_single_parent(
        &self,
        iter: u16,
        bound: NodeId,
        edge: RelId,
        nbr: NodeId,
        fwd: bool,
        block: &ObjectBlock,
    ) -> bool {
        let slot = block.reserve_next();
        slot.store_parent(iter, bound, edge, fwd);
        slot.set_next(std::ptr::null_mut());
        let head = &self.pinned_heads()[nbr.offset as usize];
        if head
            .compare_exchange(
                std::ptr::null_mut(),
                slot.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            true
        } else {
            block.revert_last();
            false
        }
    }

    fn cost_of(&self, node: NodeId) -> f64 {
        self.head_of(node).map_or(f64::MAX, |p| p.cost())
    }

    /// Weighted single-parent publication: replaces the head while the
    /// new path cost is strictly smaller than the head's. Returns false
    /// once another worker published a path at least as cheap.
    pub fn try_add_single_parent_with_weight(
        &self,
        iter: u16,
        bound: NodeId,
        edge: RelId,
        nbr: NodeId,
        fwd: bool,
        weight: f64,
        block: &ObjectBlock,
    ) -> bool {
        let new_cost = self.cost_of(bound) + weight;
        let head = &self.pinned_heads()[nbr.offset as usize];
        let mut slot: Option<&ParentList> = None;
        let mut expected = head.load(Ordering::Acquire);
        loop {
            let cur_cost = unsafe { expected.as_ref() }.map_or(f64::MAX, |p| p.cost());
            if new_cost >= cur_cost {
                if slot.is_some() {
                    block.revert_last();
                }
                return false;
            }
            let record = *slot.get_or_insert_with(|| {
                let record = block.reserve_next();
                record.store_parent(iter, bound, edge, fwd);
                record.set_cost(new_cost);
                record
            });
            record.set_next(std::ptr::null_mut());
            match head.compare_exchange(
                expected,
                record.as_ptr(),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => expected = actual,
            }
        }
    }

    /// Weighted all-paths publication: a strictly cheaper path starts a
    /// fresh chain, an equal-cost path chains in front of the existing
    /// alternatives, a costlier path is dropped.
    pub fn try_add_parent_with_weight(
        &self,
        iter: u16,
        bound: NodeId,
        edge: RelId,
        nbr: NodeId,
        fwd: bool,
        weight: f64,
        block: &ObjectBlock,
    ) -> bool {
        let new_cost = self.cost_of(bound) + weight;
        let head = &self.pinned_heads()[nbr.offset as usize];
        let mut slot: Option<&ParentList> = None;
        let mut expected = head.load(Ordering::Acquire);
        loop {
            let cur_cost = unsafe { expected.as_ref() }.map_or(f64::MAX, |p| p.cost());
            if new_cost > cur_cost {
                if slot.is_some() {
                    block.revert_last();
                }
                return false;
            }
            let record = *slot.get_or_insert_with(|| {
                let record = block.reserve_next();
                record.store_parent(iter, bound, edge, fwd);
                record.set_cost(new_cost);
                record
            });
            record.set_next(if new_cost < cur_cost {
                std::ptr::null_mut()
            } else {
                expected
            });
            match head.compare_exchange(
                expected,
                record.as_ptr(),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => expected = actual,
            }
        }
    }
}
