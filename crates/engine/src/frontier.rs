//! Frontier pair and range-morsel dispatcher.
//!
//! A frontier is the set of vertices active in one iteration. The
//! representation is a per-table `u16` mask that stores, for every
//! vertex, the iteration at which it was last activated; `UNVISITED`
//! marks vertices that never joined a frontier. One mask array can
//! therefore represent the current and the next frontier at the same
//! time: at iteration `i` the vertices with value `i - 1` form the
//! current frontier and activating a vertex stores `i`.

use std::sync::atomic::{AtomicPtr, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use atomic::Atomic;
use parking_lot::Mutex;

use crate::array::AtomicArray;
use crate::types::{NodeId, Offset, TableId, TableMap};

/// Mask value for vertices that were never activated. The iteration
/// counter must stay below it, which bounds `max_iters` to `u16::MAX - 1`.
pub const UNVISITED: u16 = u16::MAX;

/// Per-table iteration masks with two independent pin slots, one for the
/// frontier being read and one for the frontier being written. The same
/// instance can serve both roles.
pub struct PathLengths {
    masks: TableMap<AtomicArray<u16>>,
    cur_iter: AtomicU16,
    cur_ptr: AtomicPtr<Atomic<u16>>,
    cur_len: AtomicUsize,
    next_ptr: AtomicPtr<Atomic<u16>>,
    next_len: AtomicUsize,
}

impl PathLengths {
    pub fn new(max_offsets: &TableMap<Offset>) -> Self {
        let masks = max_offsets
            .iter()
            .map(|(&table, &len)| (table, AtomicArray::new(len, UNVISITED)))
            .collect();
        Self {
            masks,
            cur_iter: AtomicU16::new(0),
            cur_ptr: AtomicPtr::new(std::ptr::null_mut()),
            cur_len: AtomicUsize::new(0),
            next_ptr: AtomicPtr::new(std::ptr::null_mut()),
            next_len: AtomicUsize::new(0),
        }
    }

    pub fn cur_iter(&self) -> u16 {
        self.cur_iter.load(Ordering::Relaxed)
    }

    pub fn increment_cur_iter(&self) {
        self.cur_iter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pin_cur(&self, table: TableId) {
        let array = &self.masks[&table];
        self.cur_ptr
            .store(array.as_slice().as_ptr() as *mut Atomic<u16>, Ordering::Relaxed);
        self.cur_len.store(array.as_slice().len(), Ordering::Relaxed);
    }

    pub fn pin_next(&self, table: TableId) {
        let array = &self.masks[&table];
        self.next_ptr
            .store(array.as_slice().as_ptr() as *mut Atomic<u16>, Ordering::Relaxed);
        self.next_len.store(array.as_slice().len(), Ordering::Relaxed);
    }

    fn cur_slice(&self) -> &[Atomic<u16>] {
        let ptr = self.cur_ptr.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "current frontier not pinned");
        unsafe { std::slice::from_raw_parts(ptr, self.cur_len.load(Ordering::Relaxed)) }
    }

    fn next_slice(&self) -> &[Atomic<u16>] {
        let ptr = self.next_ptr.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "next frontier not pinned");
        unsafe { std::slice::from_raw_parts(ptr, self.next_len.load(Ordering::Relaxed)) }
    }

    /// Iteration tag of a vertex in the pinned current frontier.
    pub fn cur_value(&self, offset: Offset) -> u16 {
        self.cur_slice()[offset as usize].load(Ordering::Relaxed)
    }

    /// Iteration tag of a vertex in the pinned next frontier.
    pub fn next_value(&self, offset: Offset) -> u16 {
        self.next_slice()[offset as usize].load(Ordering::Relaxed)
    }

    pub fn is_active(&self, offset: Offset) -> bool {
        self.cur_value(offset) == self.cur_iter().wrapping_sub(1)
    }

    pub fn set_active(&self, offset: Offset) {
        self.next_slice()[offset as usize].store(self.cur_iter(), Ordering::Release);
    }

    /// Resets every mask of every table to `value` and the iteration
    /// counter to zero. Only called between runs, never concurrently
    /// with workers.
    pub fn reset(&self, value: u16) {
        for array in self.masks.values() {
            for pos in 0..array.len() {
                array.set(pos, value);
            }
        }
        self.cur_iter.store(0, Ordering::Relaxed);
    }

    pub fn table(&self, table: TableId) -> &AtomicArray<u16> {
        &self.masks[&table]
    }
}

/// Half-open offset range bound to one node table; the unit of work a
/// worker claims from the dispatcher.
#[derive(Clone, Copy, Debug)]
pub struct FrontierMorsel {
    pub table: TableId,
    pub begin: Offset,
    pub end: Offset,
}

const MIN_MORSEL_SIZE: u64 = 512;
const MIN_MORSEL_COUNT: u64 = 128;

/// Hands out range morsels over one table via an atomic offset cursor.
/// The morsel size targets at least `k²` morsels for `k` workers so that
/// stragglers can steal, clamped so dispatch overhead stays bounded.
pub struct MorselDispatcher {
    thread_count: u64,
    table: AtomicU64,
    num_offsets: AtomicU64,
    next_offset: AtomicU64,
    morsel_size: AtomicU64,
}

impl MorselDispatcher {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count as u64,
            table: AtomicU64::new(u64::MAX),
            num_offsets: AtomicU64::new(0),
            next_offset: AtomicU64::new(0),
            morsel_size: AtomicU64::new(MIN_MORSEL_SIZE),
        }
    }

    pub fn init(&self, table: TableId, num_offsets: Offset) {
        self.table.store(table, Ordering::Relaxed);
        self.num_offsets.store(num_offsets, Ordering::Relaxed);
        self.next_offset.store(0, Ordering::Relaxed);
        let ideal =
            num_offsets / MIN_MORSEL_COUNT.max(self.thread_count * self.thread_count);
        self.morsel_size
            .store(MIN_MORSEL_SIZE.max(ideal), Ordering::Relaxed);
    }

    pub fn next_morsel(&self) -> Option<FrontierMorsel> {
        let morsel_size = self.morsel_size.load(Ordering::Relaxed);
        let num_offsets = self.num_offsets.load(Ordering::Relaxed);
        let begin = self.next_offset.fetch_add(morsel_size, Ordering::AcqRel);
        if begin >= num_offsets {
            return None;
        }
        Some(FrontierMorsel {
            table: self.table.load(Ordering::Relaxed),
            begin,
            end: (begin + morsel_size).min(num_offsets),
        })
    }
}

/// Aggregates the current and next frontier, the iteration counter, the
/// approximate count of vertices activated for the next iteration and
/// the morsel dispatcher.
///
/// The active count is approximate because a vertex activated from two
/// morsels is counted twice; convergence only relies on it being zero
/// iff nothing was activated.
pub struct FrontierPair {
    frontiers: [Arc<PathLengths>; 2],
    cur_idx: AtomicUsize,
    cur_iter: AtomicU16,
    num_active_next: AtomicU64,
    num_active_cur: AtomicU64,
    swap_lock: Mutex<()>,
    dispatcher: MorselDispatcher,
    max_offsets: TableMap<Offset>,
}

impl FrontierPair {
    /// A pair where one mask array serves as both frontiers. Sufficient
    /// for monotone algorithms (shortest paths) where a vertex is only
    /// ever activated once per iteration tag.
    pub fn single(
        frontier: Arc<PathLengths>,
        max_offsets: TableMap<Offset>,
        thread_count: usize,
    ) -> Self {
        Self::with_frontiers([Arc::clone(&frontier), frontier], max_offsets, thread_count)
    }

    /// A pair of two independent mask arrays, swapped between
    /// iterations. Needed when a vertex may re-enter the frontier
    /// (variable-length joins, peeling).
    pub fn double(
        cur: Arc<PathLengths>,
        next: Arc<PathLengths>,
        max_offsets: TableMap<Offset>,
        thread_count: usize,
    ) -> Self {
        Self::with_frontiers([cur, next], max_offsets, thread_count)
    }

    fn with_frontiers(
        frontiers: [Arc<PathLengths>; 2],
        max_offsets: TableMap<Offset>,
        thread_count: usize,
    ) -> Self {
        Self {
            frontiers,
            cur_idx: AtomicUsize::new(0),
            cur_iter: AtomicU16::new(0),
            num_active_next: AtomicU64::new(0),
            num_active_cur: AtomicU64::new(0),
            swap_lock: Mutex::new(()),
            dispatcher: MorselDispatcher::new(thread_count),
            max_offsets,
        }
    }

    fn is_single(&self) -> bool {
        Arc::ptr_eq(&self.frontiers[0], &self.frontiers[1])
    }

    pub fn cur(&self) -> &PathLengths {
        &self.frontiers[self.cur_idx.load(Ordering::Relaxed)]
    }

    pub fn next(&self) -> &PathLengths {
        &self.frontiers[1 - self.cur_idx.load(Ordering::Relaxed)]
    }

    pub fn current_iter(&self) -> u16 {
        self.cur_iter.load(Ordering::Relaxed)
    }

    pub fn max_offsets(&self) -> &TableMap<Offset> {
        &self.max_offsets
    }

    /// Synchronization barrier between iterations: all workers have
    /// drained the previous iteration's morsels before the caller gets
    /// here. Advances the iteration counter, rolls the active count over
    /// and swaps the frontiers.
    pub fn begin_new_iteration(&self) {
        let _guard = self.swap_lock.lock();
        self.cur_iter.fetch_add(1, Ordering::Relaxed);
        self.num_active_cur
            .store(self.num_active_next.load(Ordering::Relaxed), Ordering::Relaxed);
        self.num_active_next.store(0, Ordering::Relaxed);
        if self.is_single() {
            self.frontiers[0].increment_cur_iter();
        } else {
            self.cur_idx.fetch_xor(1, Ordering::Relaxed);
            self.frontiers[0].increment_cur_iter();
            self.frontiers[1].increment_cur_iter();
        }
    }

    pub fn continue_next_iter(&self, max_iters: u16) -> bool {
        self.current_iter() < max_iters && self.num_active_next.load(Ordering::Relaxed) > 0
    }

    /// Pins the read side to the bound table and the write side to the
    /// neighbor table of the upcoming extension step, and arms the
    /// dispatcher with the bound table's offset range.
    pub fn begin_frontier_compute(&self, from: TableId, to: TableId) {
        self.cur().pin_cur(from);
        self.next().pin_next(to);
        self.dispatcher.init(from, self.max_offsets[&from]);
    }

    pub fn pin_next_frontier(&self, table: TableId) {
        self.next().pin_next(table);
    }

    pub fn is_active(&self, offset: Offset) -> bool {
        self.cur().is_active(offset)
    }

    /// Activates a vertex of the pinned next-frontier table and counts
    /// it. Used by vertex computes that seed a frontier.
    pub fn add_node_to_next_frontier(&self, offset: Offset) {
        self.next().set_active(offset);
        self.num_active_next.fetch_add(1, Ordering::Relaxed);
    }

    /// Activation without counting; callers batch the count through
    /// [`FrontierPair::note_active`].
    pub fn activate_next(&self, offset: Offset) {
        self.next().set_active(offset);
    }

    pub fn note_active(&self, count: u64) {
        if count > 0 {
            self.num_active_next.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Seeds the source vertex before the first iteration.
    pub fn init_source(&self, source: NodeId) {
        self.next().pin_next(source.table);
        self.add_node_to_next_frontier(source.offset);
    }

    /// Marks every vertex of every table active for the first iteration.
    pub fn set_all_active(&self) {
        let iter = self.next().cur_iter();
        let mut total = 0;
        for (&table, &len) in &self.max_offsets {
            let masks = self.next().table(table);
            for pos in 0..len {
                masks.set(pos, iter);
            }
            total += len;
        }
        self.note_active(total);
    }

    /// Resets both frontiers and the counters for a fresh run over the
    /// same allocation.
    pub fn reset(&self) {
        self.frontiers[0].reset(UNVISITED);
        if !self.is_single() {
            self.frontiers[1].reset(UNVISITED);
        }
        self.cur_iter.store(0, Ordering::Relaxed);
        self.num_active_next.store(0, Ordering::Relaxed);
        self.num_active_cur.store(0, Ordering::Relaxed);
    }

    pub fn next_morsel(&self) -> Option<FrontierMorsel> {
        self.dispatcher.next_morsel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_table(len: Offset) -> TableMap<Offset> {
        let mut map = TableMap::default();
        map.insert(0, len);
        map
    }

    #[test]
    fn dispatcher_drains_exact_range() {
        let dispatcher = MorselDispatcher::new(4);
        dispatcher.init(0, 10_000);

        let mut covered = 0;
        let mut last_end = 0;
        while let Some(morsel) = dispatcher.next_morsel() {
            assert_eq!(morsel.begin, last_end);
            assert!(morsel.end <= 10_000);
            covered += morsel.end - morsel.begin;
            last_end = morsel.end;
        }
        assert_eq!(covered, 10_000);
        assert!(dispatcher.next_morsel().is_none());
    }

    #[test]
    fn source_is_active_after_first_iteration() {
        let max_offsets = one_table(16);
        let lengths = Arc::new(PathLengths::new(&max_offsets));
        let pair = FrontierPair::single(lengths, max_offsets, 2);

        pair.init_source(NodeId::new(3, 0));
        assert!(pair.continue_next_iter(10));

        pair.begin_new_iteration();
        pair.begin_frontier_compute(0, 0);
        assert!(pair.is_active(3));
        assert!(!pair.is_active(4));
        assert!(!pair.continue_next_iter(10));
    }

    #[test]
    fn activation_moves_to_following_iteration() {
        let max_offsets = one_table(8);
        let lengths = Arc::new(PathLengths::new(&max_offsets));
        let pair = FrontierPair::single(lengths, max_offsets, 1);

        pair.init_source(NodeId::new(0, 0));
        pair.begin_new_iteration();
        pair.begin_frontier_compute(0, 0);
        pair.add_node_to_next_frontier(5);

        pair.begin_new_iteration();
        pair.begin_frontier_compute(0, 0);
        assert!(pair.is_active(5));
        assert!(!pair.is_active(0));
        // Discovery iteration doubles as the path length.
        assert_eq!(pair.cur().cur_value(5), 1);
    }

    #[test]
    fn double_pair_swaps_frontiers() {
        let max_offsets = one_table(8);
        let cur = Arc::new(PathLengths::new(&max_offsets));
        let next = Arc::new(PathLengths::new(&max_offsets));
        let pair = FrontierPair::double(cur, next, max_offsets, 1);

        pair.init_source(NodeId::new(2, 0));
        pair.begin_new_iteration();
        pair.begin_frontier_compute(0, 0);
        assert!(pair.is_active(2));

        pair.add_node_to_next_frontier(2);
        pair.begin_new_iteration();
        pair.begin_frontier_compute(0, 0);
        // Re-activated on the swapped frontier.
        assert!(pair.is_active(2));
    }
}
