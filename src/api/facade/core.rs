use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::runtime::metrics::{Statistics, StatsSnapshot};
use crate::runtime::scheduler::{self, SnapshotScheduler};
use crate::state::router;
use crate::state::shard::Shard;
use crate::storage::snapshot::{self, SnapshotData};
use crate::storage::wal::Wal;
use crate::types::{TimestampNs, Value, MAX_KEY_BYTES, SHARD_COUNT};

use super::config::StoreConfig;
use super::recovery;

/// Capacity of the bounded channel between prefix-scan workers and the
/// consumer; a slow consumer backpressures the workers through it.
const PREFIX_CHANNEL_CAPACITY: usize = 100;

/// Durable sharded key-value store.
///
/// The facade is cheap to clone; every handler shares the same state. The
/// lock order everywhere is snapshot mutex, then WAL mutex, then at most
/// one shard lock, then the statistics lock. The snapshot writer takes the
/// WAL mutex after iterating shards, which is safe because it holds no
/// shard lock by then.
#[derive(Clone)]
pub struct ShardedStore {
    inner: Arc<StoreInner>,
    scheduler: Arc<Mutex<Option<SnapshotScheduler>>>,
}

pub(crate) struct StoreInner {
    shards: Vec<Shard>,
    wal: Wal,
    snapshot_path: PathBuf,
    snapshot_mutex: Mutex<()>,
    stats: Statistics,
}

impl ShardedStore {
    /// Opens the store: creates the data directory, recovers from the
    /// snapshot and WAL, reopens the WAL for append and starts the
    /// snapshot scheduler. Served state is visible only after recovery
    /// finishes.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| StoreError::DataDir {
            path: config.data_dir.clone(),
            source,
        })?;

        let shards: Vec<Shard> = (0..SHARD_COUNT).map(|_| Shard::new()).collect();
        let recovered = recovery::restore(&config.snapshot_path(), &config.wal_path(), &shards)?;

        let (trigger, inbox) = scheduler::trigger_channel();
        let wal = Wal::open(config.wal_path(), config.wal_size_threshold, Some(trigger))?;

        let stats = Statistics::new();
        stats.reset_totals(recovered.total_keys, recovered.total_size_bytes);

        let inner = Arc::new(StoreInner {
            shards,
            wal,
            snapshot_path: config.snapshot_path(),
            snapshot_mutex: Mutex::new(()),
            stats,
        });

        let snapshot_inner = Arc::clone(&inner);
        let scheduler = SnapshotScheduler::spawn(
            inbox,
            config.snapshot_interval,
            config.coalesce_window,
            move || snapshot_inner.take_snapshot(),
        );

        tracing::info!(
            data_dir = ?config.data_dir,
            total_keys = recovered.total_keys,
            replayed_records = recovered.replayed_records,
            wal_size = inner.wal.size(),
            "store opened"
        );

        Ok(Self {
            inner,
            scheduler: Arc::new(Mutex::new(Some(scheduler))),
        })
    }

    /// Durably records the write, then installs it. The WAL record is
    /// fsynced before the shard is touched, so an acknowledged set can
    /// never be lost to a crash, and a WAL failure leaves the in-memory
    /// state unchanged.
    pub fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        validate_key(key)?;

        let value_len = value.len();
        self.inner.wal.append(key, &value)?;

        let stats = &self.inner.stats;
        self.inner.shard_for(key).write_and_then(key, value, |prior| {
            stats.record_set(prior.map(Value::len), value_len);
        });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.inner.shard_for(key).read(key);
        self.inner.stats.record_get();
        value
    }

    /// Starts a concurrent scan over every shard for keys beginning with
    /// `prefix`. Results arrive in no particular order; each matching
    /// entry is emitted exactly once. Dropping the returned iterator early
    /// stops the workers.
    pub fn scan_prefix(&self, prefix: &str) -> PrefixScan {
        PrefixScan::spawn(Arc::clone(&self.inner), prefix.to_owned())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Takes a snapshot right now and rotates the WAL, on the caller's
    /// thread. The scheduler drives the same routine.
    pub fn force_snapshot(&self) -> StoreResult<PathBuf> {
        self.inner.take_snapshot()
    }

    pub fn wal_size(&self) -> u64 {
        self.inner.wal.size()
    }

    /// Stops the snapshot scheduler and joins it. Reads and writes keep
    /// working afterwards; only automatic snapshots stop.
    pub fn close(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
    }
}

impl StoreInner {
    fn shard_for(&self, key: &str) -> &Shard {
        &self.shards[router::shard_index(key)]
    }

    /// Serializes the full dataset to disk, then rotates the WAL.
    ///
    /// The timestamp is taken before the copy: a concurrent set either
    /// released its shard lock in time to appear in the copy, or its WAL
    /// record is stamped later and survives replay because the WAL is
    /// rotated only after the snapshot rename. A failure anywhere leaves
    /// the previous snapshot and the current WAL intact.
    pub(crate) fn take_snapshot(&self) -> StoreResult<PathBuf> {
        let _guard = self.snapshot_mutex.lock();

        let timestamp = current_timestamp_ns();
        let data = snapshot::collect_union(&self.shards);
        let document = SnapshotData { timestamp, data };

        snapshot::write_snapshot(&self.snapshot_path, &document)?;
        self.wal.rotate()?;
        Ok(self.snapshot_path.clone())
    }
}

fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            reason: "key must not be empty",
        });
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StoreError::KeyTooLong {
            actual: key.len(),
            max: MAX_KEY_BYTES,
        });
    }
    // The WAL is line-oriented; these bytes would corrupt it.
    if key.contains(',') || key.contains('\n') {
        return Err(StoreError::InvalidKey {
            reason: "key must not contain ',' or '\\n'",
        });
    }
    Ok(())
}

fn current_timestamp_ns() -> TimestampNs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

/// Streaming result of a prefix scan, backed by a bounded channel fed by
/// one worker per shard. The coordinator closes the channel once every
/// worker is done; `prefix_ops` is counted when a scan runs to completion.
pub struct PrefixScan {
    rx: Receiver<(String, Value)>,
}

impl PrefixScan {
    fn spawn(inner: Arc<StoreInner>, prefix: String) -> Self {
        let (tx, rx) = mpsc::sync_channel(PREFIX_CHANNEL_CAPACITY);

        std::thread::Builder::new()
            .name("kivio-prefix-scan".to_string())
            .spawn(move || {
                let aborted = AtomicBool::new(false);
                let prefix = prefix.as_str();
                rayon::scope(|scope| {
                    for shard in &inner.shards {
                        let tx = tx.clone();
                        let aborted = &aborted;
                        scope.spawn(move |_| {
                            let completed = shard.scan_prefix(prefix, &mut |key, value| {
                                tx.send((key.to_owned(), value.clone())).is_ok()
                            });
                            if !completed {
                                aborted.store(true, Ordering::Release);
                            }
                        });
                    }
                });
                drop(tx);

                if !aborted.load(Ordering::Acquire) {
                    inner.stats.record_prefix_scan();
                }
            })
            .expect("failed to spawn prefix-scan coordinator");

        Self { rx }
    }
}

impl Iterator for PrefixScan {
    type Item = (String, Value);

    fn next(&mut self) -> Option<(String, Value)> {
        self.rx.recv().ok()
    }
}
