use kivio::Value;

use crate::support::{open_store, temp_store_dir};

#[test]
fn parallel_writers_land_every_key_with_coherent_stats() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let store = store.clone();
            scope.spawn(move || {
                for i in 0..250 {
                    store
                        .set(&format!("w{worker}-k{i}"), Value::from("payload"))
                        .unwrap();
                }
            });
        }
    });

    let stats = store.stats();
    assert_eq!(stats.total_keys, 2000);
    assert_eq!(stats.set_ops, 2000);
    assert_eq!(stats.total_size_bytes, 2000 * "payload".len() as u64);

    for worker in 0..8 {
        for i in 0..250 {
            assert!(store.get(&format!("w{worker}-k{i}")).is_some());
        }
    }
    store.close();
}

#[test]
fn readers_observe_progress_while_a_writer_runs() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());
    store.set("counter", Value::from("0")).unwrap();

    std::thread::scope(|scope| {
        let writer_store = store.clone();
        scope.spawn(move || {
            for i in 1..=100 {
                writer_store
                    .set("counter", Value::from(i.to_string().into_bytes()))
                    .unwrap();
            }
        });

        for _ in 0..4 {
            let reader_store = store.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    // Any read must see some acknowledged value.
                    assert!(reader_store.get("counter").is_some());
                }
            });
        }
    });

    assert_eq!(store.get("counter"), Some(Value::from("100")));
    store.close();
}

#[test]
fn sequential_acknowledged_sets_read_back_in_order() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());

    let first = store.clone();
    std::thread::spawn(move || first.set("k", Value::from("first")).unwrap())
        .join()
        .unwrap();
    let second = store.clone();
    std::thread::spawn(move || second.set("k", Value::from("second")).unwrap())
        .join()
        .unwrap();

    // The second set was acknowledged after the first finished, so every
    // later read sees it.
    assert_eq!(store.get("k"), Some(Value::from("second")));
    store.close();
}

#[test]
fn scans_complete_during_concurrent_writes_without_duplicates() {
    let tmp = temp_store_dir();
    let store = open_store(tmp.path());
    for i in 0..200 {
        store.set(&format!("scan-{i}"), Value::from("x")).unwrap();
    }

    std::thread::scope(|scope| {
        let writer_store = store.clone();
        scope.spawn(move || {
            for i in 200..400 {
                writer_store
                    .set(&format!("scan-{i}"), Value::from("x"))
                    .unwrap();
            }
        });

        let keys: Vec<String> = store.scan_prefix("scan-").map(|(key, _)| key).collect();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keys.len(), "a key was emitted twice");
        // Everything that existed before the scan started must be there.
        assert!(keys.len() >= 200);
    });
    store.close();
}

#[test]
fn snapshots_concurrent_with_writes_lose_no_acknowledged_write() {
    let tmp = temp_store_dir();
    {
        let store = open_store(tmp.path());
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        store
                            .set(&format!("snap-w{worker}-{i}"), Value::from("v"))
                            .unwrap();
                    }
                });
            }

            let snapshot_store = store.clone();
            scope.spawn(move || {
                for _ in 0..3 {
                    snapshot_store.force_snapshot().unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
            });
        });
        store.close();
    }

    let store = open_store(tmp.path());
    for worker in 0..4 {
        for i in 0..100 {
            assert_eq!(
                store.get(&format!("snap-w{worker}-{i}")),
                Some(Value::from("v")),
                "write snap-w{worker}-{i} was acknowledged but lost",
            );
        }
    }
    store.close();
}
