use std::io::Write;

use kivio::Value;

use crate::support::{open_store, temp_store_dir};

#[test]
fn corrupt_snapshot_is_ignored_and_wal_still_replays() {
    let tmp = temp_store_dir();
    {
        let store = open_store(tmp.path());
        store.set("x", Value::from("hello")).unwrap();
        store.close();
    }

    // Clobber the snapshot; the WAL still carries the write.
    std::fs::write(tmp.path().join("snapshot.json"), b"not json at all").unwrap();

    let store = open_store(tmp.path());
    assert_eq!(store.get("x"), Some(Value::from("hello")));
    store.close();
}

#[test]
fn malformed_wal_lines_are_skipped_not_fatal() {
    let tmp = temp_store_dir();
    {
        let store = open_store(tmp.path());
        store.set("good-1", Value::from("a")).unwrap();
        store.close();
    }

    // Interleave garbage the way a torn write or stray editor would.
    let mut wal = std::fs::OpenOptions::new()
        .append(true)
        .open(tmp.path().join("kvstore.wal"))
        .unwrap();
    wal.write_all(b"complete garbage\n").unwrap();
    wal.write_all(b"123,bad-base64,@@@@\n").unwrap();
    drop(wal);

    {
        let store = open_store(tmp.path());
        store.set("good-2", Value::from("b")).unwrap();
        store.close();
    }

    let store = open_store(tmp.path());
    assert_eq!(store.get("good-1"), Some(Value::from("a")));
    assert_eq!(store.get("good-2"), Some(Value::from("b")));
    assert_eq!(store.stats().total_keys, 2);
    store.close();
}

#[test]
fn leftover_snapshot_tmp_file_is_harmless() {
    let tmp = temp_store_dir();
    {
        let store = open_store(tmp.path());
        store.set("k", Value::from("v")).unwrap();
        store.force_snapshot().unwrap();
        store.close();
    }

    // A crash mid-snapshot leaves a tmp file behind; only the renamed
    // final path is ever read.
    std::fs::write(tmp.path().join("snapshot.json.tmp"), b"{ half a snap").unwrap();

    let store = open_store(tmp.path());
    assert_eq!(store.get("k"), Some(Value::from("v")));

    // The next snapshot overwrites the leftover and succeeds.
    store.set("k2", Value::from("v2")).unwrap();
    store.force_snapshot().unwrap();
    store.close();

    let reopened = open_store(tmp.path());
    assert_eq!(reopened.get("k2"), Some(Value::from("v2")));
    reopened.close();
}

#[test]
fn missing_files_mean_an_empty_store() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());
    assert_eq!(store.get("anything"), None);
    let stats = store.stats();
    assert_eq!(stats.total_keys, 0);
    assert_eq!(stats.total_size_bytes, 0);
    store.close();
}

#[test]
fn stale_wal_records_do_not_resurrect_old_values() {
    let tmp = temp_store_dir();
    {
        let store = open_store(tmp.path());
        store.set("k", Value::from("old")).unwrap();
        store.force_snapshot().unwrap();
        store.set("k", Value::from("new")).unwrap();
        store.close();
    }

    // Restart twice; replay must stay idempotent.
    for _ in 0..2 {
        let store = open_store(tmp.path());
        assert_eq!(store.get("k"), Some(Value::from("new")));
        store.close();
    }
}
