use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{tempdir_in, TempDir};

use kivio::{ShardedStore, StoreConfig};

pub fn testdata_dir() -> PathBuf {
    let dir = std::env::current_dir().unwrap().join("target/testdata");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn temp_store_dir() -> TempDir {
    tempdir_in(testdata_dir()).unwrap()
}

/// Config with the snapshot timer off, so tests control exactly when
/// snapshots happen.
pub fn quiet_config(data_dir: &Path) -> StoreConfig {
    StoreConfig::new(data_dir)
        .with_snapshot_interval(Duration::ZERO)
        .with_coalesce_window(Duration::ZERO)
}

pub fn open_store(data_dir: &Path) -> ShardedStore {
    ShardedStore::open(quiet_config(data_dir)).unwrap()
}
