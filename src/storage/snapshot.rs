use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::state::shard::Shard;
use crate::storage::fs::sync_directory;
use crate::types::{TimestampNs, Value};

/// On-disk snapshot document: the union of every shard plus the timestamp
/// that gates WAL replay. Values are carried as base64 strings so any byte
/// sequence round-trips exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotData {
    pub timestamp: TimestampNs,
    pub data: HashMap<String, Value>,
}

/// Copies every shard into one map, taking each shard's read lock in turn.
/// Values are shared with the live shards, not duplicated.
pub fn collect_union(shards: &[Shard]) -> HashMap<String, Value> {
    let mut union = HashMap::new();
    for shard in shards {
        shard.for_each(&mut |key, value| {
            union.insert(key.to_owned(), value.clone());
        });
    }
    union
}

/// Writes the document to a sibling `.tmp` file and renames it over
/// `path`. The rename is the point where the snapshot becomes visible; a
/// crash before it leaves the previous snapshot untouched, so no partial
/// snapshot is ever observable under the final path.
pub fn write_snapshot(path: &Path, snapshot: &SnapshotData) -> StoreResult<()> {
    let tmp_path = tmp_snapshot_path(path);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, snapshot)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }

    tracing::info!(
        path = ?path,
        keys = snapshot.data.len(),
        timestamp = snapshot.timestamp,
        "snapshot written"
    );
    Ok(())
}

/// Loads the snapshot at `path` if one exists. A file that fails to parse
/// is reported as `SnapshotCorrupted`; recovery logs it and continues from
/// an empty state.
pub fn load_snapshot(path: &Path) -> StoreResult<Option<SnapshotData>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => Err(StoreError::SnapshotCorrupted {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

pub fn tmp_snapshot_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
