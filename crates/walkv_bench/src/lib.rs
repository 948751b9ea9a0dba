//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use walkv_core::{Key, TransactionId, TransactionManager};
use walkv_storage::{InMemoryLog, InMemoryStore};

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random keys drawn from `0..key_space`.
pub fn random_keys(count: usize, key_space: u64) -> Vec<Key> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| Key::new(rng.gen_range(0..key_space.max(1))))
        .collect()
}

/// Opens a manager over fresh in-memory devices with log syncing off.
pub fn memory_manager() -> (TransactionManager, InMemoryLog, InMemoryStore) {
    let log = InMemoryLog::new();
    let store = InMemoryStore::new();
    let tm = TransactionManager::init_and_recover_with_config(
        walkv_core::Config::new().sync_on_commit(false),
        Box::new(log.clone()),
        Box::new(store.clone()),
    )
    .expect("recovery over empty devices cannot fail");
    (tm, log, store)
}

/// Builds a log holding `txns` committed transactions of `writes_per_txn`
/// writes each, none persisted to storage.
pub fn committed_log(txns: u64, writes_per_txn: usize, value_size: usize) -> InMemoryLog {
    let (mut tm, log, _store) = memory_manager();
    for id in 1..=txns {
        let txid = TransactionId::new(id);
        tm.start(txid);
        for key in random_keys(writes_per_txn, 1024) {
            tm.write(txid, key, random_data(value_size))
                .expect("bench values fit the default limit");
        }
        tm.commit(txid).expect("in-memory commit cannot fail");
    }
    log
}
