//! Per-worker output partitions.
//!
//! Result writers run as vertex computes; each worker appends rows to a
//! local partition claimed from the pool and returns it when its morsels
//! are drained. The driver merges the partitions once, after all workers
//! finished, so no append ever contends.

use parking_lot::Mutex;

/// Pool of output partitions for one algorithm invocation, generic over
/// the algorithm's row type.
pub struct TablePool<R> {
    free: Mutex<Vec<Vec<R>>>,
    full: Mutex<Vec<Vec<R>>>,
}

impl<R> Default for TablePool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TablePool<R> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            full: Mutex::new(Vec::new()),
        }
    }

    /// Claims a local partition, reusing a returned allocation if one is
    /// available.
    pub fn claim_local(&self) -> Vec<R> {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Hands a worker's partition back to the pool.
    pub fn return_local(&self, partition: Vec<R>) {
        self.full.lock().push(partition);
    }

    /// Merges all returned partitions into one table. Called by the
    /// driver after the writers completed.
    pub fn merge_local_tables(&self) -> Vec<R> {
        let mut partitions = std::mem::take(&mut *self.full.lock());
        let mut merged = Vec::with_capacity(partitions.iter().map(Vec::len).sum());
        for mut partition in partitions.drain(..) {
            merged.append(&mut partition);
        }
        merged
    }
}
