//! End-to-end tests for the filter service lifecycle and persistence.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tablefilter::{Error, FilterKey, FilterService, Options, TableId};
use tempfile::TempDir;

/// Stand-in for the host hashing call: same bytes always produce the
/// same hash pair.
fn host_hash(bytes: &[u8]) -> [u64; 2] {
    let mut h1 = DefaultHasher::new();
    bytes.hash(&mut h1);
    let first = h1.finish();

    let mut h2 = DefaultHasher::new();
    first.hash(&mut h2);
    [first, h2.finish()]
}

fn fkey<'a>(bytes: &'a [u8]) -> FilterKey<'a> {
    FilterKey::new(bytes, host_hash(bytes))
}

/// Fast flush interval so tests never wait on the default timer.
fn test_options() -> Options {
    let _ = env_logger::builder().is_test(true).try_init();
    Options::new().flush_interval(Duration::from_millis(20))
}

#[test]
fn test_basic_membership_scenario() {
    let dir = TempDir::new().unwrap();
    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();

    let table = TableId::new("app", "users");

    for name in [b"a".as_ref(), b"b".as_ref(), b"c".as_ref()] {
        assert!(service.add(&table, &fkey(name)).unwrap());
    }

    assert!(service.is_present(&table, &fkey(b"a")).unwrap());
    assert!(service.is_present(&table, &fkey(b"b")).unwrap());
    assert!(service.is_present(&table, &fkey(b"c")).unwrap());

    // Non-members are mostly absent; sample many distinct keys and require
    // the false positive rate to stay near the configured 1%.
    let mut false_positives = 0;
    let trials = 2000;
    for i in 0..trials {
        let bytes = format!("nonmember{}", i).into_bytes();
        if service.is_present(&table, &fkey(&bytes)).unwrap() {
            false_positives += 1;
        }
    }
    let rate = false_positives as f64 / trials as f64;
    println!("FP rate on non-members: {:.4}", rate);
    assert!(rate < 0.05, "false positive rate too high: {:.4}", rate);

    // After a delete the key is no longer guaranteed present.
    assert!(service.delete(&table, &fkey(b"b")).unwrap());
    assert!(service.is_present(&table, &fkey(b"a")).unwrap());
    assert!(service.is_present(&table, &fkey(b"c")).unwrap());

    service.shutdown().unwrap();
}

#[test]
fn test_persistence_round_trip() {
    let dir = TempDir::new().unwrap();
    let table = TableId::new("app", "users");

    let member_keys: Vec<Vec<u8>> =
        (0..500).map(|i| format!("member{}", i).into_bytes()).collect();
    let probe_keys: Vec<Vec<u8>> = (0..500).map(|i| format!("probe{}", i).into_bytes()).collect();

    let answers_before: Vec<bool>;
    {
        let service = FilterService::new(dir.path(), test_options()).unwrap();
        service.initialize().unwrap();

        for bytes in &member_keys {
            service.add(&table, &fkey(bytes)).unwrap();
        }

        answers_before = probe_keys
            .iter()
            .map(|bytes| service.is_present(&table, &fkey(bytes)).unwrap())
            .collect();

        // Shutdown performs the final flush.
        service.shutdown().unwrap();
    }

    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();

    // Every member answers true after reload.
    for bytes in &member_keys {
        assert!(
            service.is_present(&table, &fkey(bytes)).unwrap(),
            "member lost across restart: {:?}",
            String::from_utf8_lossy(bytes)
        );
    }

    // Probe answers are bit-exact across the round trip, false positives
    // included.
    for (bytes, &before) in probe_keys.iter().zip(answers_before.iter()) {
        assert_eq!(
            service.is_present(&table, &fkey(bytes)).unwrap(),
            before,
            "answer changed across restart for {:?}",
            String::from_utf8_lossy(bytes)
        );
    }

    service.shutdown().unwrap();
}

#[test]
fn test_background_flush_persists_without_explicit_flush() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("filters.db");

    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();

    service.add(&TableId::new("app", "users"), &fkey(b"a")).unwrap();

    // Wait for the background loop to pick up the dirty flag.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !store_path.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(store_path.exists(), "background flush never wrote the store");

    service.shutdown().unwrap();
}

#[test]
fn test_flush_skip_on_unchanged() {
    let dir = TempDir::new().unwrap();
    // Long interval keeps the background loop out of the way.
    let options = Options::new().flush_interval(Duration::from_secs(3600));

    let service = FilterService::new(dir.path(), options).unwrap();
    service.initialize().unwrap();

    service.add(&TableId::new("app", "users"), &fkey(b"a")).unwrap();

    assert!(service.flush().unwrap(), "first flush should write");
    assert!(!service.flush().unwrap(), "unchanged flush should be skipped");

    let bytes_after_first = std::fs::read(dir.path().join("filters.db")).unwrap();

    service.add(&TableId::new("app", "users"), &fkey(b"b")).unwrap();
    assert!(service.flush().unwrap(), "mutated registry should write again");

    let bytes_after_second = std::fs::read(dir.path().join("filters.db")).unwrap();
    assert_ne!(bytes_after_first, bytes_after_second);

    service.shutdown().unwrap();
}

#[test]
fn test_system_keyspaces_never_indexed_or_persisted() {
    let dir = TempDir::new().unwrap();
    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();

    for ks in ["system", "system_distributed", "system_schema", "system_auth", "system_traces"] {
        let table = TableId::new(ks, "local");

        assert!(!service.add(&table, &fkey(b"a")).unwrap());
        assert!(!service.delete(&table, &fkey(b"a")).unwrap());

        match service.is_present(&table, &fkey(b"a")) {
            Err(Error::DisallowedLookup(name)) => assert_eq!(name, ks),
            other => panic!("expected DisallowedLookup, got {:?}", other),
        }
    }

    assert_eq!(service.table_count(), 0);

    // Nothing to persist: the store stays empty of system entries even
    // after an explicit flush of the (clean) registry.
    service.flush().unwrap();
    service.shutdown().unwrap();

    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();
    assert_eq!(service.table_count(), 0);
    service.shutdown().unwrap();
}

#[test]
fn test_corrupt_store_fails_initialize() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("filters.db"), b"garbage bytes").unwrap();

    let service = FilterService::new(dir.path(), test_options()).unwrap();

    match service.initialize() {
        Err(Error::Corruption(_)) => {}
        other => panic!("expected Corruption, got {:?}", other),
    }
}

#[test]
fn test_multiple_tables_are_independent() {
    let dir = TempDir::new().unwrap();
    let service = FilterService::new(dir.path(), test_options()).unwrap();
    service.initialize().unwrap();

    let users = TableId::new("app", "users");
    let events = TableId::new("app", "events");
    let other = TableId::new("analytics", "clicks");

    service.add(&users, &fkey(b"u1")).unwrap();
    service.add(&events, &fkey(b"e1")).unwrap();
    service.add(&other, &fkey(b"c1")).unwrap();

    assert_eq!(service.table_count(), 3);

    assert!(service.is_present(&users, &fkey(b"u1")).unwrap());
    assert!(service.is_present(&events, &fkey(b"e1")).unwrap());
    assert!(service.is_present(&other, &fkey(b"c1")).unwrap());

    // Deleting from one table leaves the others alone.
    service.delete(&users, &fkey(b"u1")).unwrap();
    assert!(service.is_present(&events, &fkey(b"e1")).unwrap());
    assert!(service.is_present(&other, &fkey(b"c1")).unwrap());

    service.shutdown().unwrap();
}

#[test]
fn test_concurrent_foreground_operations() {
    use std::sync::Arc;
    use std::thread;

    let dir = TempDir::new().unwrap();
    let service = Arc::new(FilterService::new(dir.path(), test_options()).unwrap());
    service.initialize().unwrap();

    let mut handles = vec![];

    for thread_id in 0..5 {
        let service = Arc::clone(&service);
        handles.push(thread::spawn(move || {
            let table = TableId::new("app", "users");
            for i in 0..100 {
                let bytes = format!("thread{}_key{}", thread_id, i).into_bytes();
                service.add(&table, &fkey(&bytes)).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Verify all writes are visible
    let table = TableId::new("app", "users");
    for thread_id in 0..5 {
        for i in 0..100 {
            let bytes = format!("thread{}_key{}", thread_id, i).into_bytes();
            assert!(
                service.is_present(&table, &fkey(&bytes)).unwrap(),
                "missing key from thread {}: {}",
                thread_id,
                i
            );
        }
    }

    assert_eq!(service.table_count(), 1);

    service.shutdown().unwrap();
}

#[test]
fn test_drop_shuts_down_cleanly() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("filters.db");

    {
        let options = Options::new().flush_interval(Duration::from_secs(3600));
        let service = FilterService::new(dir.path(), options).unwrap();
        service.initialize().unwrap();
        service.add(&TableId::new("app", "users"), &fkey(b"a")).unwrap();
        // No explicit shutdown; Drop handles it.
    }

    // The final flush in the drop path persisted the dirty registry.
    assert!(store_path.exists());
}
