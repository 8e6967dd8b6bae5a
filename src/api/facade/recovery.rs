use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::state::router;
use crate::state::shard::Shard;
use crate::storage::snapshot;
use crate::storage::wal::WalReplay;
use crate::types::TimestampNs;

pub(crate) struct RecoveredState {
    pub snapshot_timestamp: TimestampNs,
    pub replayed_records: u64,
    pub total_keys: u64,
    pub total_size_bytes: u64,
}

/// Rebuilds the shards from the latest snapshot plus every WAL record
/// stamped after it. Runs single-threaded before any request is served,
/// so shard writes here skip the statistics bookkeeping and the totals
/// are recomputed once at the end.
pub(crate) fn restore(
    snapshot_path: &Path,
    wal_path: &Path,
    shards: &[Shard],
) -> StoreResult<RecoveredState> {
    let snapshot_timestamp = match snapshot::load_snapshot(snapshot_path) {
        Ok(Some(document)) => {
            let timestamp = document.timestamp;
            let keys = document.data.len();
            for (key, value) in document.data {
                shards[router::shard_index(&key)].write(&key, value);
            }
            tracing::info!(keys, timestamp, "restored snapshot");
            timestamp
        }
        Ok(None) => {
            tracing::info!("no snapshot found; starting from an empty state");
            0
        }
        Err(StoreError::SnapshotCorrupted { path, reason }) => {
            tracing::warn!(path = ?path, %reason, "ignoring corrupt snapshot");
            0
        }
        Err(err) => return Err(err),
    };

    let mut replayed_records = 0u64;
    if let Some(replay) = WalReplay::open(wal_path)? {
        for record in replay {
            // Records at or before the snapshot timestamp are already part
            // of the snapshot contents.
            if record.timestamp <= snapshot_timestamp {
                continue;
            }
            shards[router::shard_index(&record.key)].write(&record.key, record.value);
            replayed_records += 1;
        }
        tracing::info!(replayed_records, "WAL replay complete");
    } else {
        tracing::info!("no WAL found; nothing to replay");
    }

    let mut total_keys = 0u64;
    let mut total_size_bytes = 0u64;
    for shard in shards {
        shard.for_each(&mut |_, value| {
            total_keys += 1;
            total_size_bytes = total_size_bytes.wrapping_add(value.len() as u64);
        });
    }

    Ok(RecoveredState {
        snapshot_timestamp,
        replayed_records,
        total_keys,
        total_size_bytes,
    })
}
