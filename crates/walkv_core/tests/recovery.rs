//! End-to-end transaction and recovery tests over the in-memory and file
//! devices.

use proptest::prelude::*;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;
use walkv_core::wal::LogRecord;
use walkv_core::{CoreError, Key, Tag, TransactionId, TransactionManager};
use walkv_storage::{FileLog, InMemoryLog, InMemoryStore, LogDevice};

fn txn(id: u64) -> TransactionId {
    TransactionId::new(id)
}

fn open(log: &InMemoryLog, store: &InMemoryStore) -> TransactionManager {
    TransactionManager::init_and_recover(Box::new(log.clone()), Box::new(store.clone())).unwrap()
}

fn commit_one(tm: &mut TransactionManager, id: u64, key: u64, value: &[u8]) {
    tm.start(txn(id));
    tm.write(txn(id), Key::new(key), value.to_vec()).unwrap();
    tm.commit(txn(id)).unwrap();
}

fn confirm_all(tm: &mut TransactionManager, store: &InMemoryStore) {
    for done in store.persist_all() {
        tm.write_persisted(done.key, done.tag, &done.value).unwrap();
    }
}

fn append(log: &mut InMemoryLog, record: LogRecord) -> Tag {
    Tag::new(log.append(&record.encode().unwrap()).unwrap())
}

#[test]
fn commit_then_abort_leaves_committed_value() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);

    commit_one(&mut tm, 1, 42, b"a");
    assert_eq!(tm.read(txn(1), Key::new(42)), Some(&b"a"[..]));

    tm.start(txn(2));
    tm.write(txn(2), Key::new(42), b"b".to_vec()).unwrap();
    tm.abort(txn(2)).unwrap();

    assert_eq!(tm.read(txn(3), Key::new(42)), Some(&b"a"[..]));
}

#[test]
fn logged_commit_is_replayed_after_crash() {
    let mut log = InMemoryLog::new();
    let tag = append(&mut log, LogRecord::write(txn(3), Key::new(7), b"x".to_vec()));
    append(&mut log, LogRecord::commit(txn(3)));

    let tm = open(&log, &InMemoryStore::new());

    assert_eq!(tm.read(txn(4), Key::new(7)), Some(&b"x"[..]));
    assert!(tm.is_outstanding(tag));
    assert_eq!(tm.min_outstanding(), Some(tag));
}

#[test]
fn write_without_commit_is_ignored_after_crash() {
    let mut log = InMemoryLog::new();
    append(&mut log, LogRecord::write(txn(4), Key::new(9), b"y".to_vec()));

    let tm = open(&log, &InMemoryStore::new());

    assert!(tm.read(txn(5), Key::new(9)).is_none());
    assert_eq!(tm.outstanding_count(), 0);
    assert_eq!(tm.recovery_report().writes_ignored, 1);
    // Inert records stay in the log.
    assert_eq!(log.end_offset(), 25);
}

#[test]
fn later_commit_wins_for_same_key() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);

    commit_one(&mut tm, 1, 5, b"t1");
    commit_one(&mut tm, 2, 5, b"t2");
    assert_eq!(tm.read(txn(3), Key::new(5)), Some(&b"t2"[..]));

    drop(tm);
    store.crash();
    let tm = open(&log, &store);
    assert_eq!(tm.read(txn(3), Key::new(5)), Some(&b"t2"[..]));
}

#[test]
fn recovery_merges_stored_table_with_log() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);

    commit_one(&mut tm, 1, 1, b"durable");
    confirm_all(&mut tm, &store);
    commit_one(&mut tm, 2, 2, b"logged");
    drop(tm);
    assert_eq!(store.crash(), 1);

    let tm = open(&log, &store);
    assert_eq!(tm.read(txn(3), Key::new(1)), Some(&b"durable"[..]));
    assert_eq!(tm.read(txn(3), Key::new(2)), Some(&b"logged"[..]));
    assert_eq!(tm.recovery_report().committed_transactions, 1);
}

#[test]
fn recovering_twice_yields_same_table() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);
    commit_one(&mut tm, 1, 1, b"a");
    commit_one(&mut tm, 2, 2, b"b");
    commit_one(&mut tm, 3, 1, b"c");
    drop(tm);
    store.crash();

    let first = open(&log, &store).table().clone();
    store.crash();
    let second = open(&log, &store).table().clone();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn corrupt_log_aborts_recovery() {
    let mut log = InMemoryLog::new();
    let tag = append(&mut log, LogRecord::write(txn(1), Key::new(1), b"a".to_vec()));
    append(&mut log, LogRecord::commit(txn(1)));
    log.corrupt_byte(tag.offset(), 0xFF);

    let result =
        TransactionManager::init_and_recover(Box::new(log), Box::new(InMemoryStore::new()));
    assert!(matches!(result, Err(CoreError::MalformedRecord { .. })));
}

#[test]
fn truncation_waits_for_earliest_write() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);
    commit_one(&mut tm, 1, 1, b"a");
    commit_one(&mut tm, 2, 2, b"b");
    commit_one(&mut tm, 3, 3, b"c");

    for key in [3, 2] {
        let done = store.persist_key(Key::new(key)).unwrap();
        tm.write_persisted(done.key, done.tag, &done.value).unwrap();
        assert_eq!(tm.truncation_offset(), 0);
    }

    let done = store.persist_key(Key::new(1)).unwrap();
    tm.write_persisted(done.key, done.tag, &done.value).unwrap();
    assert_eq!(tm.truncation_offset(), log.end_offset());
    assert_eq!(log.retained_len(), 0);
}

#[test]
fn truncated_log_recovers_from_stored_table() {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let mut tm = open(&log, &store);
    commit_one(&mut tm, 1, 1, b"a");
    commit_one(&mut tm, 2, 2, b"b");
    confirm_all(&mut tm, &store);
    drop(tm);

    let tm = open(&log, &store);
    assert_eq!(tm.recovery_report().records_scanned, 0);
    assert_eq!(tm.read(txn(3), Key::new(1)), Some(&b"a"[..]));
    assert_eq!(tm.read(txn(3), Key::new(2)), Some(&b"b"[..]));
}

#[test]
fn file_log_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let store = InMemoryStore::new();

    {
        let log = FileLog::open(&path).unwrap();
        let mut tm =
            TransactionManager::init_and_recover(Box::new(log), Box::new(store.clone())).unwrap();
        commit_one(&mut tm, 1, 10, b"one");
        commit_one(&mut tm, 2, 20, b"two");
        let done = store.persist_next().unwrap();
        tm.write_persisted(done.key, done.tag, &done.value).unwrap();
    }
    store.crash();

    let log = FileLog::open(&path).unwrap();
    assert_eq!(log.truncation_offset(), 51);
    let tm = TransactionManager::init_and_recover(Box::new(log), Box::new(store)).unwrap();
    assert_eq!(tm.read(txn(3), Key::new(10)), Some(&b"one"[..]));
    assert_eq!(tm.read(txn(3), Key::new(20)), Some(&b"two"[..]));
    assert_eq!(tm.outstanding_count(), 1);
}

#[test]
fn torn_file_tail_is_discarded_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let store = InMemoryStore::new();

    {
        let log = FileLog::open(&path).unwrap();
        let mut tm =
            TransactionManager::init_and_recover(Box::new(log), Box::new(store.clone())).unwrap();
        commit_one(&mut tm, 1, 10, b"one");
    }
    // Half of a WRITE record whose commit never finished.
    let partial = LogRecord::write(txn(2), Key::new(20), b"two".to_vec()).encode().unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..10]).unwrap();
    drop(file);
    store.crash();

    let log = FileLog::open(&path).unwrap();
    assert_eq!(log.end_offset(), 51);
    let tm = TransactionManager::init_and_recover(Box::new(log), Box::new(store)).unwrap();
    assert_eq!(tm.read(txn(3), Key::new(10)), Some(&b"one"[..]));
    assert!(tm.read(txn(3), Key::new(20)).is_none());
    assert_eq!(tm.recovery_report().records_scanned, 2);
}

#[derive(Debug, Clone)]
enum Step {
    Commit(Vec<(u8, Vec<u8>)>),
    Abort(Vec<(u8, Vec<u8>)>),
    PersistKey(u8),
    Crash,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let writes = prop::collection::vec(
        (0u8..6, prop::collection::vec(any::<u8>(), 0..8)),
        0..4,
    );
    prop_oneof![
        4 => writes.clone().prop_map(Step::Commit),
        1 => writes.prop_map(Step::Abort),
        3 => (0u8..6).prop_map(Step::PersistKey),
        1 => Just(Step::Crash),
    ]
}

proptest! {
    /// Committed writes are visible, aborted ones never are, crashes lose
    /// nothing committed, and truncation never passes an outstanding tag.
    #[test]
    fn model_matches_after_any_sequence(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let log = InMemoryLog::new();
        let store = InMemoryStore::new();
        let mut tm = open(&log, &store);
        let mut model: HashMap<Key, Vec<u8>> = HashMap::new();
        let mut next_id = 1;

        for step in steps {
            match step {
                Step::Commit(writes) => {
                    let id = txn(next_id);
                    next_id += 1;
                    tm.start(id);
                    for (key, value) in &writes {
                        tm.write(id, Key::new(u64::from(*key)), value.clone()).unwrap();
                    }
                    for (key, _) in &writes {
                        let key = Key::new(u64::from(*key));
                        prop_assert_eq!(tm.read(id, key), model.get(&key).map(Vec::as_slice));
                    }
                    tm.commit(id).unwrap();
                    for (key, value) in writes {
                        model.insert(Key::new(u64::from(key)), value);
                    }
                }
                Step::Abort(writes) => {
                    let id = txn(next_id);
                    next_id += 1;
                    tm.start(id);
                    for (key, value) in writes {
                        tm.write(id, Key::new(u64::from(key)), value).unwrap();
                    }
                    tm.abort(id).unwrap();
                }
                Step::PersistKey(key) => {
                    if let Some(done) = store.persist_key(Key::new(u64::from(key))) {
                        tm.write_persisted(done.key, done.tag, &done.value).unwrap();
                    }
                }
                Step::Crash => {
                    drop(tm);
                    store.crash();
                    tm = open(&log, &store);
                }
            }

            if let Some(min) = tm.min_outstanding() {
                prop_assert!(tm.truncation_offset() <= min.offset());
            }
            for (key, value) in &model {
                prop_assert_eq!(tm.read(txn(0), *key), Some(value.as_slice()));
            }
            prop_assert_eq!(tm.table().len(), model.len());
        }
    }
}
