use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::types::Value;

/// One in-memory partition of the key space.
///
/// Readers share the lock; writers are exclusive. Visitors must not call
/// back into the same shard, and nothing here may block on the WAL (the
/// lock order is WAL before shard).
#[derive(Default)]
pub struct Shard {
    map: RwLock<HashMap<String, Value>>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, key: &str) -> Option<Value> {
        self.map.read().get(key).cloned()
    }

    /// Installs `value` under `key` and returns the previous value so the
    /// caller can keep the statistics coherent.
    pub fn write(&self, key: &str, value: Value) -> Option<Value> {
        self.map.write().insert(key.to_owned(), value)
    }

    /// Installs `value` and invokes `update` with the prior value while the
    /// write lock is still held, so statistics can never disagree with the
    /// shard contents. `update` must not touch this shard again.
    pub fn write_and_then<R>(
        &self,
        key: &str,
        value: Value,
        update: impl FnOnce(Option<&Value>) -> R,
    ) -> R {
        let mut map = self.map.write();
        let prior = map.insert(key.to_owned(), value);
        update(prior.as_ref())
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Visits every entry under the read lock.
    pub fn for_each(&self, visitor: &mut dyn FnMut(&str, &Value)) {
        let map = self.map.read();
        for (key, value) in map.iter() {
            visitor(key, value);
        }
    }

    /// Emits every entry whose key starts with `prefix`. Returns `false`
    /// when the consumer reported it is no longer interested, which stops
    /// the traversal early.
    pub fn scan_prefix(&self, prefix: &str, emit: &mut dyn FnMut(&str, &Value) -> bool) -> bool {
        let map = self.map.read();
        for (key, value) in map.iter() {
            if key.starts_with(prefix) && !emit(key, value) {
                return false;
            }
        }
        true
    }
}
