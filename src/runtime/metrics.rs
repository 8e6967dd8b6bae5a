//! Operation counters exposed through the `Stat` call.

use parking_lot::Mutex;

/// Point-in-time copy of the store counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_keys: u64,
    pub total_size_bytes: u64,
    pub set_ops: u64,
    pub get_ops: u64,
    pub prefix_ops: u64,
}

/// Store-wide counters. `total_keys` always equals the sum of shard sizes
/// and `total_size_bytes` the sum of resident value lengths; both are kept
/// coherent by updating them under this lock while the written shard's
/// write lock is still held.
#[derive(Debug, Default)]
pub struct Statistics {
    counters: Mutex<StatsSnapshot>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_set(&self, prior_len: Option<usize>, new_len: usize) {
        let mut counters = self.counters.lock();
        match prior_len {
            Some(prior) => {
                counters.total_size_bytes = counters.total_size_bytes.wrapping_sub(prior as u64);
            }
            None => counters.total_keys += 1,
        }
        counters.total_size_bytes = counters.total_size_bytes.wrapping_add(new_len as u64);
        counters.set_ops += 1;
    }

    pub fn record_get(&self) {
        self.counters.lock().get_ops += 1;
    }

    pub fn record_prefix_scan(&self) {
        self.counters.lock().prefix_ops += 1;
    }

    /// Replaces the residency totals after recovery. Op counters restart
    /// at zero with every process.
    pub fn reset_totals(&self, total_keys: u64, total_size_bytes: u64) {
        let mut counters = self.counters.lock();
        counters.total_keys = total_keys;
        counters.total_size_bytes = total_size_bytes;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }
}
