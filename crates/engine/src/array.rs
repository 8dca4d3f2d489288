//! Per-table dense atomic arrays.
//!
//! One contiguous allocation per node table, sized to the table's maximum
//! offset. A table can be pinned, after which the offset-indexed accessors
//! read through a single cached pointer. Multi-label graphs touch one
//! table per extension step, so the pin amortizes the table lookup out of
//! the inner loop.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use atomic::Atomic;

use crate::types::{Offset, TableId, TableMap};

/// Contiguous buffer of atomics, one slot per dense offset. Never resized
/// during an invocation.
pub struct AtomicArray<T: Copy> {
    data: Box<[Atomic<T>]>,
}

impl<T: Copy> AtomicArray<T> {
    pub fn new(len: Offset, init: T) -> Self {
        let data = (0..len).map(|_| Atomic::new(init)).collect();
        Self { data }
    }

    pub fn len(&self) -> Offset {
        self.data.len() as Offset
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, pos: Offset) -> T {
        debug_assert!(pos < self.len());
        self.data[pos as usize].load(Ordering::Relaxed)
    }

    pub fn set(&self, pos: Offset, value: T) {
        debug_assert!(pos < self.len());
        self.data[pos as usize].store(value, Ordering::Relaxed);
    }

    pub fn compare_exchange(&self, pos: Offset, current: T, new: T) -> Result<T, T> {
        debug_assert!(pos < self.len());
        self.data[pos as usize].compare_exchange(
            current,
            new,
            Ordering::Relaxed,
            Ordering::Relaxed,
        )
    }

    pub fn as_slice(&self) -> &[Atomic<T>] {
        &self.data
    }
}

impl AtomicArray<u64> {
    pub fn fetch_add(&self, pos: Offset, value: u64) -> u64 {
        debug_assert!(pos < self.len());
        self.data[pos as usize].fetch_add(value, Ordering::Relaxed)
    }

    pub fn fetch_sub(&self, pos: Offset, value: u64) -> u64 {
        debug_assert!(pos < self.len());
        self.data[pos as usize].fetch_sub(value, Ordering::Relaxed)
    }
}

/// One [`AtomicArray`] per node table plus a pinned pointer for the
/// offset-indexed hot path. Callers guarantee `offset < max_offset` of
/// the pinned table; debug builds assert it.
pub struct TableAtomicArrays<T: Copy> {
    arrays: TableMap<AtomicArray<T>>,
    pinned: AtomicPtr<Atomic<T>>,
    pinned_len: AtomicUsize,
}

impl<T: Copy> TableAtomicArrays<T> {
    pub fn new(max_offsets: &TableMap<Offset>, init: T) -> Self {
        let arrays = max_offsets
            .iter()
            .map(|(&table, &len)| (table, AtomicArray::new(len, init)))
            .collect();
        Self {
            arrays,
            pinned: AtomicPtr::new(std::ptr::null_mut()),
            pinned_len: AtomicUsize::new(0),
        }
    }

    /// Sets the active table. Subsequent indexed accesses target it.
    pub fn pin(&self, table: TableId) {
        let array = &self.arrays[&table];
        self.pinned
            .store(array.data.as_ptr() as *mut Atomic<T>, Ordering::Relaxed);
        self.pinned_len
            .store(array.data.len(), Ordering::Relaxed);
    }

    /// Unpinned access to a table's array.
    pub fn array(&self, table: TableId) -> &AtomicArray<T> {
        &self.arrays[&table]
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableId, &AtomicArray<T>)> {
        self.arrays.iter().map(|(&t, a)| (t, a))
    }

    fn pinned_slice(&self) -> &[Atomic<T>] {
        let ptr = self.pinned.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "no table pinned");
        // The pointer targets an array owned by `self.arrays`, which is
        // never mutated after construction.
        unsafe { std::slice::from_raw_parts(ptr, self.pinned_len.load(Ordering::Relaxed)) }
    }

    pub fn get(&self, offset: Offset) -> T {
        self.pinned_slice()[offset as usize].load(Ordering::Relaxed)
    }

    pub fn set(&self, offset: Offset, value: T) {
        self.pinned_slice()[offset as usize].store(value, Ordering::Relaxed);
    }

    pub fn compare_exchange(&self, offset: Offset, current: T, new: T) -> Result<T, T> {
        self.pinned_slice()[offset as usize].compare_exchange(
            current,
            new,
            Ordering::Relaxed,
            Ordering::Relaxed,
        )
    }
}

impl TableAtomicArrays<u64> {
    pub fn fetch_add(&self, offset: Offset, value: u64) -> u64 {
        self.pinned_slice()[offset as usize].fetch_add(value, Ordering::Relaxed)
    }

    pub fn fetch_sub(&self, offset: Offset, value: u64) -> u64 {
        self.pinned_slice()[offset as usize].fetch_sub(value, Ordering::Relaxed)
    }
}

/// Current/next view over one [`TableAtomicArrays`] with two independent
/// pin slots. Edge computes read the source-side value through `cur` and
/// update the destination-side value through `next`; both sides may pin
/// the same table.
pub struct TableArrayPair<'a, T: Copy> {
    arrays: &'a TableAtomicArrays<T>,
    cur_ptr: AtomicPtr<Atomic<T>>,
    cur_len: AtomicUsize,
    next_ptr: AtomicPtr<Atomic<T>>,
    next_len: AtomicUsize,
}

impl<'a, T: Copy> TableArrayPair<'a, T> {
    pub fn new(arrays: &'a TableAtomicArrays<T>) -> Self {
        Self {
            arrays,
            cur_ptr: AtomicPtr::new(std::ptr::null_mut()),
            cur_len: AtomicUsize::new(0),
            next_ptr: AtomicPtr::new(std::ptr::null_mut()),
            next_len: AtomicUsize::new(0),
        }
    }

    pub fn pin_cur(&self, table: TableId) {
        let array = self.arrays.array(table);
        self.cur_ptr
            .store(array.data.as_ptr() as *mut Atomic<T>, Ordering::Relaxed);
        self.cur_len.store(array.data.len(), Ordering::Relaxed);
    }

    pub fn pin_next(&self, table: TableId) {
        let array = self.arrays.array(table);
        self.next_ptr
            .store(array.data.as_ptr() as *mut Atomic<T>, Ordering::Relaxed);
        self.next_len.store(array.data.len(), Ordering::Relaxed);
    }

    fn cur_slice(&self) -> &[Atomic<T>] {
        let ptr = self.cur_ptr.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "cur side not pinned");
        unsafe { std::slice::from_raw_parts(ptr, self.cur_len.load(Ordering::Relaxed)) }
    }

    fn next_slice(&self) -> &[Atomic<T>] {
        let ptr = self.next_ptr.load(Ordering::Relaxed);
        debug_assert!(!ptr.is_null(), "next side not pinned");
        unsafe { std::slice::from_raw_parts(ptr, self.next_len.load(Ordering::Relaxed)) }
    }

    pub fn cur_get(&self, offset: Offset) -> T {
        self.cur_slice()[offset as usize].load(Ordering::Relaxed)
    }

    pub fn next_get(&self, offset: Offset) -> T {
        self.next_slice()[offset as usize].load(Ordering::Relaxed)
    }

    pub fn next_set(&self, offset: Offset, value: T) {
        self.next_slice()[offset as usize].store(value, Ordering::Relaxed);
    }

    pub fn next_compare_exchange(&self, offset: Offset, current: T, new: T) -> Result<T, T> {
        self.next_slice()[offset as usize].compare_exchange(
            current,
            new,
            Ordering::Relaxed,
            Ordering::Relaxed,
        )
    }
}

impl<T: Copy + PartialOrd> TableArrayPair<'_, T> {
    /// Monotonically-decreasing compare-and-swap: publishes the bound
    /// vertex's value onto the neighbor iff it is strictly smaller.
    /// Returns whether this worker's CAS won.
    pub fn update_min(&self, bound_offset: Offset, nbr_offset: Offset) -> bool {
        let value = self.cur_get(bound_offset);
        let slot = &self.next_slice()[nbr_offset as usize];
        let mut observed = slot.load(Ordering::Relaxed);
        while value < observed {
            match slot.compare_exchange_weak(observed, value, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => observed = actual,
            }
        }
        false
    }
}

impl TableArrayPair<'_, u64> {
    pub fn next_fetch_add(&self, offset: Offset, value: u64) -> u64 {
        self.next_slice()[offset as usize].fetch_add(value, Ordering::Relaxed)
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
    fn pin_and_access() {
        let arrays = TableAtomicArrays::new(&one_table(8), 7u64);
        arrays.pin(0);

        assert_eq!(arrays.get(3), 7);
        arrays.set(3, 11);
        assert_eq!(arrays.get(3), 11);
        assert_eq!(arrays.fetch_add(3, 2), 11);
        assert_eq!(arrays.get(3), 13);
    }

    #[test]
    fn compare_exchange_loses_on_stale_value() {
        let arrays = TableAtomicArrays::new(&one_table(2), 5u64);
        arrays.pin(0);

        assert!(arrays.compare_exchange(0, 5, 1).is_ok());
        assert_eq!(arrays.compare_exchange(0, 5, 2), Err(1));
    }

    #[test]
    fn update_min_only_decreases() {
        let arrays = TableAtomicArrays::new(&one_table(4), 0u64);
        arrays.pin(0);
        for pos in 0..4 {
            arrays.set(pos, pos);
        }

        let pair = TableArrayPair::new(&arrays);
        pair.pin_cur(0);
        pair.pin_next(0);

        assert!(pair.update_min(1, 3));
        assert_eq!(pair.next_get(3), 1);
        assert!(!pair.update_min(2, 3));
        assert_eq!(pair.next_get(3), 1);
    }

    #[test]
    fn tables_are_independent() {
        let mut map = TableMap::default();
        map.insert(0, 4);
        map.insert(1, 4);
        let arrays = TableAtomicArrays::new(&map, 0u64);

        arrays.pin(0);
        arrays.set(2, 42);
        arrays.pin(1);
        assert_eq!(arrays.get(2), 0);
        assert_eq!(arrays.array(0).get(2), 42);
    }
}
