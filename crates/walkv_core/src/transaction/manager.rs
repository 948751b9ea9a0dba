//! Transaction manager.

use crate::config::Config;
use crate::durability::{Confirmation, DurabilityTracker};
use crate::error::{CoreError, CoreResult};
use crate::recovery::{RecoveryReport, RecoveryScan};
use crate::stats::{StatsCounters, TransactionStats};
use crate::table::VisibleTable;
use crate::transaction::buffer::TransactionBuffer;
use crate::types::{Key, Tag, TransactionId};
use crate::wal::WalManager;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use walkv_storage::{LogDevice, StorageDevice};

/// Orchestrates transactions over a log device and a storage device.
///
/// Each transaction moves from active to committed or aborted and never
/// back. Writes are buffered until commit, which appends them to the log
/// followed by a COMMIT record, waits for the log to be durable, and only
/// then makes them visible and hands them to the storage device.
///
/// Writes stay *outstanding* until the storage device confirms them through
/// [`write_persisted`](Self::write_persisted). The log is never truncated
/// past the smallest outstanding tag.
///
/// Calls must not overlap. The manager takes `&mut self` for everything
/// that changes state.
///
/// If the log sync fails after a commit batch was appended, the manager is
/// poisoned: every later write, commit, abort, confirmation and truncation
/// fails with [`CoreError::Poisoned`] until it is reopened. Reads keep
/// working.
///
/// # Example
///
/// ```rust
/// use walkv_core::{Key, TransactionId, TransactionManager};
/// use walkv_storage::{InMemoryLog, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// let mut tm = TransactionManager::init_and_recover(
///     Box::new(InMemoryLog::new()),
///     Box::new(store.clone()),
/// )
/// .unwrap();
///
/// let txid = TransactionId::new(1);
/// tm.start(txid);
/// tm.write(txid, Key::new(42), b"a".to_vec()).unwrap();
/// tm.commit(txid).unwrap();
/// assert_eq!(tm.read(txid, Key::new(42)), Some(&b"a"[..]));
///
/// for done in store.persist_all() {
///     tm.write_persisted(done.key, done.tag, &done.value).unwrap();
/// }
/// assert_eq!(tm.outstanding_count(), 0);
/// ```
pub struct TransactionManager {
    config: Config,
    wal: WalManager,
    store: Box<dyn StorageDevice>,
    table: VisibleTable,
    buffers: HashMap<TransactionId, TransactionBuffer>,
    tracker: DurabilityTracker,
    /// Highest id passed to `start` or found in the log.
    last_started: Option<TransactionId>,
    recovery: RecoveryReport,
    stats: StatsCounters,
    /// Set when a commit's sync failed; its batch may or may not be durable.
    poisoned: Option<TransactionId>,
}

impl TransactionManager {
    /// Recovers state from the devices with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`init_and_recover_with_config`](Self::init_and_recover_with_config).
    pub fn init_and_recover(
        log: Box<dyn LogDevice>,
        store: Box<dyn StorageDevice>,
    ) -> CoreResult<Self> {
        Self::init_and_recover_with_config(Config::default(), log, store)
    }

    /// Recovers state from the devices.
    ///
    /// The visible table is seeded from the storage device's durable table,
    /// then every committed write still in the log is replayed over it,
    /// registered outstanding and queued on the storage device again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedRecord`] if the log cannot be decoded
    /// up to its end offset, or a storage error if either device fails.
    /// No manager is produced in either case.
    pub fn init_and_recover_with_config(
        config: Config,
        log: Box<dyn LogDevice>,
        mut store: Box<dyn StorageDevice>,
    ) -> CoreResult<Self> {
        let wal = WalManager::new(log);
        let mut table = VisibleTable::from_stored(store.read_stored_table()?);
        let mut tracker = DurabilityTracker::new();

        let scan = RecoveryScan::read(wal.device())
            .inspect_err(|err| error!(error = %err, "recovery aborted"))?;
        let recovery = scan.replay(&mut table, &mut tracker, &mut *store)?;

        info!(
            start = recovery.start_offset,
            end = recovery.end_offset,
            records = recovery.records_scanned,
            committed = recovery.committed_transactions,
            uncommitted = recovery.uncommitted_transactions,
            replayed = recovery.writes_replayed,
            keys = table.len(),
            "recovery complete"
        );

        Ok(Self {
            config,
            wal,
            store,
            table,
            buffers: HashMap::new(),
            tracker,
            last_started: recovery.max_txid,
            recovery,
            stats: StatsCounters::default(),
            poisoned: None,
        })
    }

    /// Starts a transaction.
    ///
    /// Ids are expected to increase with every call, including across
    /// restarts. A smaller or repeated id is still accepted, replacing any
    /// buffer already held for it.
    pub fn start(&mut self, txid: TransactionId) {
        if self.last_started.is_some_and(|last| txid <= last) {
            warn!(%txid, last = ?self.last_started, "transaction id does not increase");
        }
        if self.buffers.insert(txid, TransactionBuffer::new(txid)).is_some() {
            warn!(%txid, "restarted active transaction, buffered writes dropped");
        }
        self.last_started = self.last_started.max(Some(txid));
        self.stats.record_start();
    }

    /// Returns the committed value for `key`.
    ///
    /// Reads see only committed data. Writes buffered by `txid` itself are
    /// not visible until it commits.
    #[must_use]
    pub fn read(&self, _txid: TransactionId, key: Key) -> Option<&[u8]> {
        self.table.value(key)
    }

    /// Buffers a write. Nothing is logged until commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTransaction`] if `txid` is not active,
    /// [`CoreError::ValueTooLarge`] if the value exceeds the configured
    /// maximum, or [`CoreError::Poisoned`] after a failed commit sync.
    pub fn write(&mut self, txid: TransactionId, key: Key, value: Vec<u8>) -> CoreResult<()> {
        self.ensure_usable()?;
        let max = self.config.effective_max_value_size();
        let buffer = self
            .buffers
            .get_mut(&txid)
            .ok_or_else(|| CoreError::unknown_transaction(txid))?;
        if value.len() > max {
            return Err(CoreError::value_too_large(value.len(), max));
        }
        buffer.write(key, value);
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// Appends the buffered WRITE records and a COMMIT record, syncs the
    /// log (unless disabled in [`Config`]), then registers every write
    /// outstanding, applies it to the visible table and queues it on the
    /// storage device. Once the log is synced the transaction survives a
    /// crash.
    ///
    /// The buffer is consumed whatever the outcome. If the append fails
    /// the transaction counts as aborted; records already appended carry
    /// no COMMIT and are ignored by recovery. If the sync fails the batch
    /// is neither visible nor outstanding and the manager is poisoned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTransaction`] if `txid` is not active,
    /// [`CoreError::Poisoned`] after an earlier failed sync, or a storage
    /// error if the log or storage device fails.
    pub fn commit(&mut self, txid: TransactionId) -> CoreResult<()> {
        self.ensure_usable()?;
        let buffer = self
            .buffers
            .remove(&txid)
            .ok_or_else(|| CoreError::unknown_transaction(txid))?;
        let batch = buffer.into_commit_batch();

        let tags = match self.wal.append_batch(&batch.records) {
            Ok(tags) => tags,
            Err(err) => {
                warn!(%txid, error = %err, "commit append failed, transaction aborted");
                self.stats.record_abort();
                return Err(err);
            }
        };
        if self.config.sync_on_commit {
            if let Err(err) = self.wal.sync() {
                error!(%txid, error = %err, "log sync failed after append, manager poisoned");
                self.poisoned = Some(txid);
                return Err(err);
            }
        }
        self.stats
            .record_append(batch.records.len() as u64, batch.encoded_len() as u64);

        let mut queued = Vec::with_capacity(batch.writeset.len());
        for (entry, tag) in batch.writeset.into_iter().zip(tags) {
            self.tracker.register(tag);
            self.table.apply(entry.key, tag, entry.value.clone());
            queued.push((entry.key, tag, entry.value));
        }
        // Already durable in the log; a failed queue leaves the tags
        // outstanding and recovery will queue them again.
        for (key, tag, value) in queued {
            self.store.queue_write(key, tag, value)?;
        }

        self.stats.record_commit();
        debug!(%txid, end = self.wal.end_offset(), "committed");
        Ok(())
    }

    /// Aborts a transaction, discarding its buffered writes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTransaction`] if `txid` is not active.
    pub fn abort(&mut self, txid: TransactionId) -> CoreResult<()> {
        self.ensure_usable()?;
        let buffer = self
            .buffers
            .remove(&txid)
            .ok_or_else(|| CoreError::unknown_transaction(txid))?;
        self.stats.record_abort();
        debug!(%txid, writes = buffer.len(), "aborted");
        Ok(())
    }

    /// Records that the storage device made the write under `tag` durable.
    ///
    /// When `tag` was the smallest outstanding tag the log truncation
    /// offset advances to the next outstanding tag, or to the end of the
    /// log when nothing is left outstanding. A tag that is not outstanding
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the truncation offset cannot be updated,
    /// or [`CoreError::Poisoned`] after a failed commit sync.
    pub fn write_persisted(&mut self, key: Key, tag: Tag, value: &[u8]) -> CoreResult<()> {
        self.ensure_usable()?;
        self.stats.record_confirmation();
        match self.tracker.confirm(tag) {
            Confirmation::NotOutstanding => {
                warn!(%key, %tag, "persistence confirmed for a tag that is not outstanding");
                Ok(())
            }
            Confirmation::Removed => {
                debug!(%key, %tag, len = value.len(), "write persisted");
                Ok(())
            }
            Confirmation::RemovedMinimum => {
                debug!(%key, %tag, len = value.len(), "write persisted");
                if self.config.truncate_on_persist {
                    self.truncate_log()?;
                }
                Ok(())
            }
        }
    }

    /// Advances the log truncation offset as far as is safe.
    ///
    /// Returns the resulting truncation offset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TruncationViolation`] if the computed target
    /// would pass an outstanding tag, or a storage error if the log device
    /// rejects the new offset.
    pub fn truncate_log(&mut self) -> CoreResult<u64> {
        self.ensure_usable()?;
        let target = self.tracker.safe_truncation(self.wal.end_offset());
        self.tracker.check_truncation(target)?;
        if self.wal.advance_truncation(target)? {
            self.stats.record_truncation();
            debug!(offset = target, "log truncated");
        }
        Ok(self.wal.truncation_offset())
    }

    fn ensure_usable(&self) -> CoreResult<()> {
        match self.poisoned {
            Some(txid) => Err(CoreError::poisoned(txid)),
            None => Ok(()),
        }
    }

    /// Returns true if a failed commit sync left the manager unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the report produced by recovery.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Returns a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> TransactionStats {
        self.stats.snapshot()
    }

    /// Returns the visible table.
    #[must_use]
    pub fn table(&self) -> &VisibleTable {
        &self.table
    }

    /// Returns the number of writes not yet confirmed durable.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.tracker.len()
    }

    /// Returns the smallest tag not yet confirmed durable.
    #[must_use]
    pub fn min_outstanding(&self) -> Option<Tag> {
        self.tracker.min_outstanding()
    }

    /// Returns true if the write under `tag` is awaiting confirmation.
    #[must_use]
    pub fn is_outstanding(&self, tag: Tag) -> bool {
        self.tracker.contains(tag)
    }

    /// Returns the number of active transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if `txid` is active.
    #[must_use]
    pub fn is_active(&self, txid: TransactionId) -> bool {
        self.buffers.contains_key(&txid)
    }

    /// Returns the log truncation offset.
    #[must_use]
    pub fn truncation_offset(&self) -> u64 {
        self.wal.truncation_offset()
    }

    /// Returns the log end offset.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.wal.end_offset()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("wal", &self.wal)
            .field("keys", &self.table.len())
            .field("active", &self.buffers.len())
            .field("outstanding", &self.tracker.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkv_storage::{InMemoryLog, InMemoryStore};

    fn create_manager() -> (TransactionManager, InMemoryLog, InMemoryStore) {
        let log = InMemoryLog::new();
        let store = InMemoryStore::new();
        let tm = TransactionManager::init_and_recover(
            Box::new(log.clone()),
            Box::new(store.clone()),
        )
        .unwrap();
        (tm, log, store)
    }

    fn txn(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn write_requires_active_transaction() {
        let (mut tm, _, _) = create_manager();
        let result = tm.write(txn(1), Key::new(1), b"a".to_vec());
        assert!(matches!(result, Err(CoreError::UnknownTransaction { .. })));
    }

    #[test]
    fn commit_makes_writes_visible() {
        let (mut tm, log, store) = create_manager();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(42), b"a".to_vec()).unwrap();
        assert!(tm.read(txn(1), Key::new(42)).is_none());
        assert_eq!(log.end_offset(), 0);

        tm.commit(txn(1)).unwrap();

        assert_eq!(tm.read(txn(1), Key::new(42)), Some(&b"a"[..]));
        assert_eq!(log.end_offset(), 25 + 24);
        assert_eq!(store.pending(), 1);
        assert!(tm.is_outstanding(Tag::new(0)));
        assert!(!tm.is_active(txn(1)));
    }

    #[test]
    fn abort_discards_without_log_io() {
        let (mut tm, log, store) = create_manager();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(42), b"b".to_vec()).unwrap();
        tm.abort(txn(1)).unwrap();

        assert!(tm.read(txn(1), Key::new(42)).is_none());
        assert_eq!(log.end_offset(), 0);
        assert_eq!(store.pending(), 0);
        assert!(matches!(
            tm.commit(txn(1)),
            Err(CoreError::UnknownTransaction { .. })
        ));
    }

    #[test]
    fn abort_unknown_transaction_fails() {
        let (mut tm, _, _) = create_manager();
        assert!(matches!(
            tm.abort(txn(7)),
            Err(CoreError::UnknownTransaction { .. })
        ));
    }

    #[test]
    fn empty_commit_logs_commit_record() {
        let (mut tm, log, _) = create_manager();
        tm.start(txn(1));
        tm.commit(txn(1)).unwrap();

        assert_eq!(log.end_offset(), 24);
        assert_eq!(tm.outstanding_count(), 0);
    }

    #[test]
    fn value_over_limit_is_rejected() {
        let log = InMemoryLog::new();
        let config = Config::new().max_value_size(4);
        let mut tm = TransactionManager::init_and_recover_with_config(
            config,
            Box::new(log),
            Box::new(InMemoryStore::new()),
        )
        .unwrap();

        tm.start(txn(1));
        let result = tm.write(txn(1), Key::new(1), b"12345".to_vec());
        assert!(matches!(result, Err(CoreError::ValueTooLarge { size: 5, max: 4 })));
        assert!(tm.is_active(txn(1)));
    }

    #[test]
    fn persisting_minimum_advances_truncation() {
        let (mut tm, log, store) = create_manager();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(1), b"a".to_vec()).unwrap();
        tm.commit(txn(1)).unwrap();
        tm.start(txn(2));
        tm.write(txn(2), Key::new(2), b"b".to_vec()).unwrap();
        tm.commit(txn(2)).unwrap();

        let first = store.persist_next().unwrap();
        tm.write_persisted(first.key, first.tag, &first.value).unwrap();
        assert_eq!(tm.truncation_offset(), 49);

        let second = store.persist_next().unwrap();
        tm.write_persisted(second.key, second.tag, &second.value)
            .unwrap();
        assert_eq!(tm.truncation_offset(), log.end_offset());
        assert_eq!(tm.stats().truncation_advances, 2);
    }

    #[test]
    fn out_of_order_persistence_holds_truncation() {
        let (mut tm, _, store) = create_manager();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(1), b"a".to_vec()).unwrap();
        tm.write(txn(1), Key::new(2), b"b".to_vec()).unwrap();
        tm.commit(txn(1)).unwrap();

        let later = store.persist_key(Key::new(2)).unwrap();
        tm.write_persisted(later.key, later.tag, &later.value).unwrap();
        assert_eq!(tm.truncation_offset(), 0);
        assert_eq!(tm.min_outstanding(), Some(Tag::new(0)));
    }

    #[test]
    fn unknown_confirmation_is_ignored() {
        let (mut tm, _, _) = create_manager();
        tm.write_persisted(Key::new(1), Tag::new(500), b"x").unwrap();
        assert_eq!(tm.truncation_offset(), 0);
        assert_eq!(tm.stats().persist_confirmations, 1);
    }

    #[test]
    fn truncation_can_be_disabled() {
        let store = InMemoryStore::new();
        let mut tm = TransactionManager::init_and_recover_with_config(
            Config::new().truncate_on_persist(false),
            Box::new(InMemoryLog::new()),
            Box::new(store.clone()),
        )
        .unwrap();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(1), b"a".to_vec()).unwrap();
        tm.commit(txn(1)).unwrap();

        for done in store.persist_all() {
            tm.write_persisted(done.key, done.tag, &done.value).unwrap();
        }
        assert_eq!(tm.truncation_offset(), 0);
        assert_eq!(tm.truncate_log().unwrap(), tm.end_offset());
    }

    #[test]
    fn stats_track_lifecycle() {
        let (mut tm, _, _) = create_manager();
        tm.start(txn(1));
        tm.write(txn(1), Key::new(1), b"abc".to_vec()).unwrap();
        tm.commit(txn(1)).unwrap();
        tm.start(txn(2));
        tm.abort(txn(2)).unwrap();

        let stats = tm.stats();
        assert_eq!(stats.transactions_started, 2);
        assert_eq!(stats.transactions_committed, 1);
        assert_eq!(stats.transactions_aborted, 1);
        assert_eq!(stats.log_records_appended, 2);
        assert_eq!(stats.log_bytes_appended, 27 + 24);
    }

    #[test]
    fn recovery_continues_id_sequence() {
        let log = InMemoryLog::new();
        let store = InMemoryStore::new();
        {
            let mut tm = TransactionManager::init_and_recover(
                Box::new(log.clone()),
                Box::new(store.clone()),
            )
            .unwrap();
            tm.start(txn(8));
            tm.commit(txn(8)).unwrap();
        }

        let tm = TransactionManager::init_and_recover(Box::new(log), Box::new(store)).unwrap();
        assert_eq!(tm.recovery_report().max_txid, Some(txn(8)));
    }
}
