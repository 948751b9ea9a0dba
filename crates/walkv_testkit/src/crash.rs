//! Crash recovery testing for walkv.
//!
//! A crash is simulated by dropping the [`TransactionManager`] and every
//! storage write that was queued but not yet persisted, then recovering a
//! fresh manager over the same log and the same durable stored table.
//!
//! ## Test Strategy
//!
//! 1. **Crash before commit** - buffered writes never reach the log
//! 2. **Crash during commit** - the log device fails part way through the
//!    batch, leaving WRITE records without their COMMIT
//! 3. **Crash after commit** - logged writes survive even though the
//!    storage device lost them
//! 4. **Crash after persistence** - truncated writes come back from the
//!    stored table
//!
//! ## Usage
//!
//! ```rust
//! use walkv_core::Key;
//! use walkv_testkit::crash::CrashHarness;
//!
//! let mut harness = CrashHarness::new();
//! let committed = harness
//!     .commit_with_crash(&[(Key::new(1), b"a".to_vec())], 1)
//!     .unwrap();
//! assert!(!committed);
//! assert_eq!(harness.read(Key::new(1)), None);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use walkv_core::{Config, CoreResult, Key, RecoveryReport, TransactionId, TransactionManager};
use walkv_storage::{InMemoryLog, InMemoryStore, LogDevice, StorageError, StorageResult};

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Writes buffered, commit never called.
    BeforeCommit,
    /// The log accepts this many records of the commit batch, then fails.
    DuringCommit {
        /// Records appended before the failure.
        appends: usize,
    },
    /// Commit returned, storage device persisted nothing.
    AfterCommit,
    /// Commit returned and the storage device persisted everything.
    AfterPersist,
}

impl CrashPoint {
    /// Returns true if a transaction crashed at this point must be visible
    /// after recovery. `batch_len` is the number of records in its commit
    /// batch, COMMIT included.
    #[must_use]
    pub fn survives(self, batch_len: usize) -> bool {
        match self {
            Self::BeforeCommit => false,
            Self::DuringCommit { appends } => appends >= batch_len,
            Self::AfterCommit | Self::AfterPersist => true,
        }
    }
}

#[derive(Debug)]
struct CrashControl {
    appends_left: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl Default for CrashControl {
    fn default() -> Self {
        Self {
            appends_left: AtomicUsize::new(usize::MAX),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }
}

/// A log device wrapper that can simulate crashes.
///
/// Clones share both the wrapped log and the crash controls, so a test can
/// arm a crash on a handle while the manager owns another.
#[derive(Debug, Clone)]
pub struct CrashableLog {
    inner: InMemoryLog,
    control: Arc<CrashControl>,
}

impl CrashableLog {
    /// Wraps a log. No crash is armed.
    pub fn new(inner: InMemoryLog) -> Self {
        Self {
            inner,
            control: Arc::new(CrashControl::default()),
        }
    }

    /// Lets `appends` more appends through, then fails every append.
    pub fn crash_after_appends(&self, appends: usize) {
        self.control.appends_left.store(appends, Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.control.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.control.appends_left.store(usize::MAX, Ordering::SeqCst);
        self.control.crashed.store(false, Ordering::SeqCst);
        self.control.fail_on_sync.store(false, Ordering::SeqCst);
    }

    /// Returns whether the device has crashed.
    pub fn has_crashed(&self) -> bool {
        self.control.crashed.load(Ordering::SeqCst)
    }

    /// Returns the wrapped log.
    pub fn inner(&self) -> &InMemoryLog {
        &self.inner
    }

    fn simulated(&self, what: &str) -> StorageError {
        self.control.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl LogDevice for CrashableLog {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(self.simulated("append"));
        }
        let left = self.control.appends_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(self.simulated("append"));
        }
        if left != usize::MAX {
            self.control.appends_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.append(data)
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn truncation_offset(&self) -> u64 {
        self.inner.truncation_offset()
    }

    fn set_truncation_offset(&mut self, offset: u64) -> StorageResult<()> {
        self.inner.set_truncation_offset(offset)
    }

    fn end_offset(&self) -> u64 {
        self.inner.end_offset()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.control.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.simulated("sync"));
        }
        self.inner.sync()
    }
}

/// Test harness for crash recovery scenarios.
///
/// Owns a shared in-memory log and store plus the manager running over
/// them. Transaction ids are handed out in increasing order and continue
/// past whatever recovery found in the log.
#[derive(Debug)]
pub struct CrashHarness {
    device: CrashableLog,
    store: InMemoryStore,
    config: Config,
    manager: Option<TransactionManager>,
    next_txid: u64,
}

impl Default for CrashHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashHarness {
    /// Creates a harness over an empty log and store.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a harness with a custom manager configuration.
    pub fn with_config(config: Config) -> Self {
        Self::from_devices(config, InMemoryLog::new(), InMemoryStore::new())
            .expect("recovery over empty devices cannot fail")
    }

    /// Creates a harness over existing devices, running recovery.
    ///
    /// # Errors
    ///
    /// Returns the recovery error if the log cannot be recovered.
    pub fn from_devices(config: Config, log: InMemoryLog, store: InMemoryStore) -> CoreResult<Self> {
        let mut harness = Self {
            device: CrashableLog::new(log),
            store,
            config,
            manager: None,
            next_txid: 1,
        };
        harness.recover()?;
        Ok(harness)
    }

    /// Returns the running manager.
    ///
    /// # Panics
    ///
    /// Panics if the last recovery failed.
    pub fn manager(&self) -> &TransactionManager {
        self.manager.as_ref().expect("manager is not running")
    }

    /// Returns the running manager mutably.
    ///
    /// # Panics
    ///
    /// Panics if the last recovery failed.
    pub fn manager_mut(&mut self) -> &mut TransactionManager {
        self.manager.as_mut().expect("manager is not running")
    }

    /// Returns the shared log.
    pub fn log(&self) -> &InMemoryLog {
        self.device.inner()
    }

    /// Returns the shared store.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Returns the crash controls of the manager's log device.
    pub fn device(&self) -> &CrashableLog {
        &self.device
    }

    /// Returns a fresh transaction id.
    pub fn next_txid(&mut self) -> TransactionId {
        let txid = TransactionId::new(self.next_txid);
        self.next_txid += 1;
        txid
    }

    /// Starts a transaction and buffers `writes` without committing.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected.
    pub fn begin(&mut self, writes: &[(Key, Vec<u8>)]) -> CoreResult<TransactionId> {
        let txid = self.next_txid();
        let tm = self.manager_mut();
        tm.start(txid);
        for (key, value) in writes {
            tm.write(txid, *key, value.clone())?;
        }
        Ok(txid)
    }

    /// Runs a transaction with `writes` and commits it.
    ///
    /// # Errors
    ///
    /// Returns an error if a write or the commit fails.
    pub fn commit(&mut self, writes: &[(Key, Vec<u8>)]) -> CoreResult<TransactionId> {
        let txid = self.begin(writes)?;
        self.manager_mut().commit(txid)?;
        Ok(txid)
    }

    /// Runs a transaction with `writes` and aborts it.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected.
    pub fn abort(&mut self, writes: &[(Key, Vec<u8>)]) -> CoreResult<TransactionId> {
        let txid = self.begin(writes)?;
        self.manager_mut().abort(txid)?;
        Ok(txid)
    }

    /// Reads the committed value of `key`.
    pub fn read(&self, key: Key) -> Option<Vec<u8>> {
        self.manager()
            .read(TransactionId::new(self.next_txid), key)
            .map(<[u8]>::to_vec)
    }

    /// Persists every queued write and reports each one to the manager.
    ///
    /// Returns the number of writes persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager cannot advance truncation.
    pub fn persist_all(&mut self) -> CoreResult<usize> {
        let done = self.store.persist_all();
        let tm = self.manager_mut();
        for write in &done {
            tm.write_persisted(write.key, write.tag, &write.value)?;
        }
        Ok(done.len())
    }

    /// Persists the oldest queued write for `key` and reports it.
    ///
    /// Returns false if nothing was queued for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager cannot advance truncation.
    pub fn persist_key(&mut self, key: Key) -> CoreResult<bool> {
        match self.store.persist_key(key) {
            Some(write) => {
                self.manager_mut()
                    .write_persisted(write.key, write.tag, &write.value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops the manager and every unpersisted storage write.
    ///
    /// Returns the number of storage writes lost.
    pub fn crash(&mut self) -> usize {
        self.manager = None;
        self.store.crash()
    }

    /// Recovers a new manager over the surviving devices.
    ///
    /// # Errors
    ///
    /// Returns the recovery error, leaving no manager running.
    pub fn recover(&mut self) -> CoreResult<&RecoveryReport> {
        self.device.reset();
        let tm = TransactionManager::init_and_recover_with_config(
            self.config.clone(),
            Box::new(self.device.clone()),
            Box::new(self.store.clone()),
        )?;
        if let Some(max) = tm.recovery_report().max_txid {
            self.next_txid = self.next_txid.max(max.as_u64() + 1);
        }
        Ok(self.manager.insert(tm).recovery_report())
    }

    /// Crashes and recovers.
    ///
    /// # Errors
    ///
    /// Returns the recovery error.
    pub fn crash_and_recover(&mut self) -> CoreResult<&RecoveryReport> {
        self.crash();
        self.recover()
    }

    /// Commits `writes` on a log that fails after `appends` more appends,
    /// then crashes and recovers.
    ///
    /// Returns whether the commit itself reported success.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected or recovery fails.
    pub fn commit_with_crash(&mut self, writes: &[(Key, Vec<u8>)], appends: usize) -> CoreResult<bool> {
        let txid = self.begin(writes)?;
        self.device.crash_after_appends(appends);
        let committed = self.manager_mut().commit(txid).is_ok();
        self.crash_and_recover()?;
        Ok(committed)
    }

    /// Drives one transaction to `point`, then crashes and recovers.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected or recovery fails.
    pub fn run_to_crash(&mut self, writes: &[(Key, Vec<u8>)], point: CrashPoint) -> CoreResult<()> {
        match point {
            CrashPoint::BeforeCommit => {
                self.begin(writes)?;
            }
            CrashPoint::DuringCommit { appends } => {
                self.commit_with_crash(writes, appends)?;
                return Ok(());
            }
            CrashPoint::AfterCommit => {
                self.commit(writes)?;
            }
            CrashPoint::AfterPersist => {
                self.commit(writes)?;
                self.persist_all()?;
            }
        }
        self.crash_and_recover()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkv_core::wal::LogRecord;
    use walkv_core::{CoreError, Tag};

    fn writes(pairs: &[(u64, &str)]) -> Vec<(Key, Vec<u8>)> {
        pairs
            .iter()
            .map(|(key, value)| (Key::new(*key), value.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn commit_is_visible() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(42, "a")])).unwrap();
        assert_eq!(harness.read(Key::new(42)), Some(b"a".to_vec()));
    }

    #[test]
    fn abort_keeps_previous_value() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(42, "a")])).unwrap();
        harness.abort(&writes(&[(42, "b")])).unwrap();

        assert_eq!(harness.read(Key::new(42)), Some(b"a".to_vec()));
        harness.crash_and_recover().unwrap();
        assert_eq!(harness.read(Key::new(42)), Some(b"a".to_vec()));
    }

    #[test]
    fn logged_commit_survives_lost_storage_writes() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(7, "x")])).unwrap();

        assert_eq!(harness.crash(), 1);
        harness.recover().unwrap();

        assert_eq!(harness.read(Key::new(7)), Some(b"x".to_vec()));
        assert!(harness.manager().is_outstanding(Tag::new(0)));
        assert_eq!(harness.store().pending(), 1);
    }

    #[test]
    fn write_without_commit_is_ignored() {
        let mut log = InMemoryLog::new();
        let record = LogRecord::write(TransactionId::new(4), Key::new(9), b"y".to_vec());
        log.append(&record.encode().unwrap()).unwrap();

        let harness =
            CrashHarness::from_devices(Config::default(), log, InMemoryStore::new()).unwrap();

        assert_eq!(harness.read(Key::new(9)), None);
        assert_eq!(harness.manager().recovery_report().writes_ignored, 1);
    }

    #[test]
    fn every_crash_point_is_atomic() {
        let batch = writes(&[(1, "one"), (2, "two"), (3, "three")]);
        let batch_len = batch.len() + 1;

        let mut points = vec![
            CrashPoint::BeforeCommit,
            CrashPoint::AfterCommit,
            CrashPoint::AfterPersist,
        ];
        points.extend((0..=batch_len).map(|appends| CrashPoint::DuringCommit { appends }));

        for point in points {
            let mut harness = CrashHarness::new();
            harness.commit(&writes(&[(1, "old")])).unwrap();
            harness.run_to_crash(&batch, point).unwrap();

            if point.survives(batch_len) {
                for (key, value) in &batch {
                    assert_eq!(harness.read(*key).as_ref(), Some(value), "{point:?}");
                }
            } else {
                assert_eq!(harness.read(Key::new(1)), Some(b"old".to_vec()), "{point:?}");
                assert_eq!(harness.read(Key::new(2)), None, "{point:?}");
                assert_eq!(harness.read(Key::new(3)), None, "{point:?}");
            }
        }
    }

    #[test]
    fn failed_commit_consumes_transaction() {
        let mut harness = CrashHarness::new();
        let txid = harness.begin(&writes(&[(1, "a")])).unwrap();
        harness.device().crash_after_appends(1);

        assert!(harness.manager_mut().commit(txid).is_err());
        assert!(!harness.manager().is_active(txid));
        assert!(harness.device().has_crashed());
        assert_eq!(harness.read(Key::new(1)), None);
    }

    #[test]
    fn failed_sync_after_append_still_recovers_commit() {
        let mut harness = CrashHarness::new();
        let txid = harness.begin(&writes(&[(5, "v")])).unwrap();
        harness.device().set_fail_on_sync(true);

        assert!(harness.manager_mut().commit(txid).is_err());
        harness.crash_and_recover().unwrap();

        assert_eq!(harness.read(Key::new(5)), Some(b"v".to_vec()));
    }

    #[test]
    fn failed_sync_blocks_truncation_until_reopen() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(1, "a")])).unwrap();
        let txid = harness.begin(&writes(&[(5, "v")])).unwrap();
        harness.device().set_fail_on_sync(true);

        assert!(harness.manager_mut().commit(txid).is_err());
        assert!(harness.manager().is_poisoned());
        harness.device().set_fail_on_sync(false);

        let result = harness.commit(&writes(&[(6, "w")]));
        assert!(matches!(result, Err(CoreError::Poisoned { .. })));
        let result = harness.persist_all();
        assert!(matches!(result, Err(CoreError::Poisoned { .. })));
        assert_eq!(harness.manager().truncation_offset(), 0);

        harness.crash_and_recover().unwrap();
        assert!(!harness.manager().is_poisoned());
        assert_eq!(harness.read(Key::new(1)), Some(b"a".to_vec()));
        assert_eq!(harness.read(Key::new(5)), Some(b"v".to_vec()));
        assert_eq!(harness.read(Key::new(6)), None);

        harness.persist_all().unwrap();
        assert_eq!(harness.manager().truncation_offset(), harness.manager().end_offset());
    }

    #[test]
    fn repeated_crashes_are_idempotent() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(1, "a"), (2, "b")])).unwrap();
        harness.persist_key(Key::new(2)).unwrap();
        harness.commit(&writes(&[(1, "c")])).unwrap();

        harness.crash_and_recover().unwrap();
        let first = harness.manager().table().clone();
        harness.crash_and_recover().unwrap();
        let second = harness.manager().table().clone();

        assert_eq!(first, second);
        assert_eq!(harness.read(Key::new(1)), Some(b"c".to_vec()));
    }

    #[test]
    fn txids_continue_after_recovery() {
        let mut log = InMemoryLog::new();
        log.append(&LogRecord::commit(TransactionId::new(41)).encode().unwrap())
            .unwrap();

        let mut harness =
            CrashHarness::from_devices(Config::default(), log, InMemoryStore::new()).unwrap();
        assert_eq!(harness.next_txid(), TransactionId::new(42));
    }

    #[test]
    fn torn_record_fails_recovery() {
        let mut harness = CrashHarness::new();
        harness.commit(&writes(&[(1, "a")])).unwrap();
        harness.crash();

        let mut log = harness.log().clone();
        log.append(&[0, 0, 0, 99, 1, 2]).unwrap();

        let result = harness.recover();
        assert!(matches!(result, Err(CoreError::MalformedRecord { .. })));
    }
}
