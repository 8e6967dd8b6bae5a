use std::path::{Path, PathBuf};
use std::time::Duration;

/// WAL size at which a snapshot is requested.
pub const DEFAULT_WAL_SIZE_THRESHOLD: u64 = 256 * 1024 * 1024;

const WAL_FILE_NAME: &str = "kvstore.wal";
const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the snapshot, the active WAL and rotated backups.
    /// Created if absent.
    pub data_dir: PathBuf,
    /// Interval between timer-driven snapshots. Zero disables the timer;
    /// size-triggered snapshots still run.
    pub snapshot_interval: Duration,
    /// WAL size that signals the scheduler to snapshot.
    pub wal_size_threshold: u64,
    /// How long a size-triggered wake waits before snapshotting, so a
    /// burst of large writes collapses into one snapshot.
    pub coalesce_window: Duration,
}

impl StoreConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            snapshot_interval: Duration::from_secs(300),
            wal_size_threshold: DEFAULT_WAL_SIZE_THRESHOLD,
            coalesce_window: Duration::from_secs(2),
        }
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_wal_size_threshold(mut self, threshold: u64) -> Self {
        self.wal_size_threshold = threshold;
        self
    }

    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}
