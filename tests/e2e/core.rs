use kivio::{StoreError, Value};

use crate::support::{open_store, temp_store_dir};

#[test]
fn overwrite_then_get_returns_the_latest_value() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    store.set("alpha", Value::from("1")).unwrap();
    store.set("alpha", Value::from("2")).unwrap();

    assert_eq!(store.get("alpha"), Some(Value::from("2")));
    let stats = store.stats();
    assert_eq!(stats.total_keys, 1);
    assert_eq!(stats.set_ops, 2);
    store.close();
}

#[test]
fn prefix_stream_emits_every_match_once() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    store.set("k1", Value::from("v1")).unwrap();
    store.set("k2", Value::from("v2")).unwrap();

    let mut pairs: Vec<(String, Value)> = store.scan_prefix("k").collect();
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    assert_eq!(
        pairs,
        vec![
            ("k1".to_owned(), Value::from("v1")),
            ("k2".to_owned(), Value::from("v2")),
        ]
    );
    store.close();
}

#[test]
fn oversized_key_is_rejected_without_state_change() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    let before = store.stats();
    let key = "x".repeat(129);
    match store.set(&key, Value::from("v")) {
        Err(StoreError::KeyTooLong { actual: 129, max: 128 }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.get(&key), None);
    assert_eq!(store.stats().total_keys, before.total_keys);
    assert_eq!(store.stats().set_ops, before.set_ops);
    store.close();
}

#[test]
fn empty_value_counts_the_key_with_zero_bytes() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    store.set("k", Value::empty()).unwrap();
    assert_eq!(store.get("k"), Some(Value::empty()));

    let stats = store.stats();
    assert_eq!(stats.total_keys, 1);
    assert_eq!(stats.total_size_bytes, 0);
    store.close();
}

#[test]
fn get_and_stat_counters_track_traffic() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    store.set("k", Value::from("v")).unwrap();
    store.get("k");
    store.get("missing");

    let stats = store.stats();
    assert_eq!(stats.set_ops, 1);
    assert_eq!(stats.get_ops, 2);
    // Stat itself leaves the counters untouched.
    assert_eq!(stats, store.stats());
    store.close();
}
