use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::runtime::scheduler::SnapshotTrigger;
use crate::storage::fs::sync_directory;
use crate::types::{TimestampNs, Value};

pub mod format;
pub mod replay;

pub use format::{MalformedRecord, WalRecord};
pub use replay::WalReplay;

/// Append-only write-ahead log.
///
/// One mutex serializes appends; each record is fsynced before the call
/// returns, so an acknowledged append is durable. The tracked size feeds
/// the snapshot trigger, and `rotate` swaps in a fresh file once a
/// snapshot has made the old records redundant.
pub struct Wal {
    path: PathBuf,
    size_threshold: u64,
    trigger: Option<SnapshotTrigger>,
    state: Mutex<WalState>,
}

struct WalState {
    file: File,
    size: u64,
    last_timestamp: TimestampNs,
}

impl Wal {
    /// Opens (or creates) the WAL at `path` for append and records its
    /// current size.
    pub fn open(
        path: impl AsRef<Path>,
        size_threshold: u64,
        trigger: Option<SnapshotTrigger>,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let size = file.metadata()?.len();
        tracing::info!(path = ?path, size, "opened WAL for append");
        Ok(Self {
            path,
            size_threshold,
            trigger,
            state: Mutex::new(WalState {
                file,
                size,
                last_timestamp: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Appends one record and forces it to stable storage. Returns the
    /// record's timestamp, strictly greater than any timestamp this
    /// process handed out before.
    ///
    /// On failure the partial write is rewound best-effort and the error
    /// is returned; the caller must not mutate in-memory state for the
    /// request.
    pub fn append(&self, key: &str, value: &Value) -> StoreResult<TimestampNs> {
        let mut state = self.state.lock();
        let timestamp = next_timestamp(state.last_timestamp);
        let record = format::encode_record(timestamp, key, value);

        if let Err(err) = append_and_sync(&mut state.file, record.as_bytes()) {
            // Drop any torn tail so the next append starts on a line boundary.
            let _ = state.file.set_len(state.size);
            return Err(err.into());
        }

        state.last_timestamp = timestamp;
        state.size += record.len() as u64;
        let size = state.size;
        drop(state);

        if size > self.size_threshold {
            if let Some(trigger) = &self.trigger {
                trigger.notify();
            }
        }

        Ok(timestamp)
    }

    /// Retires the active file as `<path>.<unix_seconds>` and starts a
    /// fresh empty WAL. Backups are retained; nothing garbage-collects
    /// them. Callers must only rotate after the covering snapshot has been
    /// renamed into place.
    pub fn rotate(&self) -> StoreResult<PathBuf> {
        let mut state = self.state.lock();
        state.file.sync_data()?;

        let mut unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        // Two rotations inside one second must not clobber the earlier backup.
        let mut backup_path = backup_wal_path(&self.path, unix_seconds);
        while backup_path.exists() {
            unix_seconds += 1;
            backup_path = backup_wal_path(&self.path, unix_seconds);
        }
        std::fs::rename(&self.path, &backup_path)?;

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.sync_all()?;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }

        state.file = file;
        state.size = 0;
        tracing::info!(backup = ?backup_path, "rotated WAL");
        Ok(backup_path)
    }
}

fn append_and_sync(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.sync_data()
}

fn backup_wal_path(path: &Path, unix_seconds: u64) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{unix_seconds}"));
    PathBuf::from(name)
}

fn next_timestamp(last: TimestampNs) -> TimestampNs {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);
    now.max(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir_in;

    fn testdata_dir() -> PathBuf {
        let dir = std::env::current_dir().unwrap().join("target/testdata");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn append_is_readable_by_replay() {
        let tmp = tempdir_in(testdata_dir()).unwrap();
        let wal = Wal::open(tmp.path().join("kvstore.wal"), u64::MAX, None).unwrap();

        let first_ts = wal.append("a", &Value::from("1")).unwrap();
        let second_ts = wal.append("b", &Value::from("2")).unwrap();
        assert!(second_ts > first_ts);

        let records: Vec<WalRecord> = WalReplay::open(wal.path()).unwrap().unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "a");
        assert_eq!(records[0].timestamp, first_ts);
        assert_eq!(records[1].value, Value::from("2"));
    }

    #[test]
    fn size_tracks_appended_bytes() {
        let tmp = tempdir_in(testdata_dir()).unwrap();
        let wal = Wal::open(tmp.path().join("kvstore.wal"), u64::MAX, None).unwrap();
        assert_eq!(wal.size(), 0);

        wal.append("key", &Value::from("value")).unwrap();
        let on_disk = std::fs::metadata(wal.path()).unwrap().len();
        assert_eq!(wal.size(), on_disk);
    }

    #[test]
    fn reopen_resumes_at_existing_size() {
        let tmp = tempdir_in(testdata_dir()).unwrap();
        let path = tmp.path().join("kvstore.wal");
        {
            let wal = Wal::open(&path, u64::MAX, None).unwrap();
            wal.append("k", &Value::from("v")).unwrap();
        }
        let reopened = Wal::open(&path, u64::MAX, None).unwrap();
        assert!(reopened.size() > 0);
        reopened.append("k2", &Value::from("v2")).unwrap();

        let records: Vec<WalRecord> = WalReplay::open(&path).unwrap().unwrap().collect();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn rotate_keeps_a_backup_and_resets_size() {
        let tmp = tempdir_in(testdata_dir()).unwrap();
        let wal = Wal::open(tmp.path().join("kvstore.wal"), u64::MAX, None).unwrap();
        wal.append("k", &Value::from("v")).unwrap();

        let backup = wal.rotate().unwrap();
        assert!(backup.exists());
        assert_eq!(wal.size(), 0);
        assert_eq!(std::fs::metadata(wal.path()).unwrap().len(), 0);

        let backup_records: Vec<WalRecord> =
            WalReplay::open(&backup).unwrap().unwrap().collect();
        assert_eq!(backup_records.len(), 1);

        wal.append("after", &Value::from("rotation")).unwrap();
        let active: Vec<WalRecord> = WalReplay::open(wal.path()).unwrap().unwrap().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, "after");
    }

    #[test]
    fn timestamps_stay_strictly_monotonic() {
        let tmp = tempdir_in(testdata_dir()).unwrap();
        let wal = Wal::open(tmp.path().join("kvstore.wal"), u64::MAX, None).unwrap();
        let mut previous = 0;
        for i in 0..100 {
            let ts = wal.append(&format!("k{i}"), &Value::empty()).unwrap();
            assert!(ts > previous);
            previous = ts;
        }
    }
}
