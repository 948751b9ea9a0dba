//! Crash recovery.
//!
//! Recovery runs in two explicit passes over the retained log:
//!
//! 1. **Classify**: collect every transaction id that has a COMMIT record
//!    anywhere in the scanned range. A COMMIT may follow its writes at any
//!    distance and transactions may interleave, so this is a membership
//!    test over the whole range rather than a running state machine.
//! 2. **Replay**: walk the records again in log order and apply each WRITE
//!    of a committed transaction to the visible table, the durability
//!    tracker and the storage device.
//!
//! WRITEs of transactions without a COMMIT stay in the log untouched; they
//! are inert until truncation passes them. A malformed record aborts
//! recovery: record offsets are derived from earlier sizes, so nothing past
//! a bad record can be located reliably.

use crate::durability::DurabilityTracker;
use crate::error::CoreResult;
use crate::table::VisibleTable;
use crate::types::{Tag, TransactionId};
use crate::wal::{LogRecord, LogScanner};
use std::collections::HashSet;
use walkv_storage::{LogDevice, StorageDevice};

/// Summary of a recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Offset the scan started at (the truncation offset).
    pub start_offset: u64,
    /// Offset the scan stopped at (the end offset).
    pub end_offset: u64,
    /// Records decoded.
    pub records_scanned: u64,
    /// Transactions with a COMMIT record.
    pub committed_transactions: u64,
    /// Transactions with writes but no COMMIT record.
    pub uncommitted_transactions: u64,
    /// WRITE records applied to the visible table.
    pub writes_replayed: u64,
    /// WRITE records skipped because their transaction never committed.
    pub writes_ignored: u64,
    /// Highest transaction id seen in the log.
    pub max_txid: Option<TransactionId>,
}

/// The decoded and classified contents of a log.
#[derive(Debug, Clone)]
pub struct RecoveryScan {
    records: Vec<(Tag, LogRecord)>,
    committed: HashSet<TransactionId>,
    start_offset: u64,
    end_offset: u64,
}

impl RecoveryScan {
    /// Reads every record from the truncation offset to the end offset and
    /// classifies transactions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::MalformedRecord`] on the first record
    /// that cannot be decoded, or a storage error if the log cannot be read.
    pub fn read(log: &dyn LogDevice) -> CoreResult<Self> {
        let scanner = LogScanner::new(log);
        let start_offset = scanner.position();
        let end_offset = scanner.end();

        let records = scanner.collect::<CoreResult<Vec<_>>>()?;
        let committed = classify(&records);

        Ok(Self {
            records,
            committed,
            start_offset,
            end_offset,
        })
    }

    /// Returns every decoded record with its tag, in log order.
    #[must_use]
    pub fn records(&self) -> &[(Tag, LogRecord)] {
        &self.records
    }

    /// Returns true if `txid` has a COMMIT record in the scanned range.
    #[must_use]
    pub fn is_committed(&self, txid: TransactionId) -> bool {
        self.committed.contains(&txid)
    }

    /// Iterates over the WRITE records of committed transactions, in log
    /// order.
    pub fn committed_writes(&self) -> impl Iterator<Item = (Tag, &LogRecord)> + '_ {
        self.records
            .iter()
            .filter(|(_, record)| record.is_write() && self.is_committed(record.txid))
            .map(|(tag, record)| (*tag, record))
    }

    /// Builds a report of the scan without replaying anything.
    #[must_use]
    pub fn report(&self) -> RecoveryReport {
        let mut writers = HashSet::new();
        let mut writes_replayed = 0;
        let mut writes_ignored = 0;
        let mut max_txid = None;

        for (_, record) in &self.records {
            max_txid = max_txid.max(Some(record.txid));
            if record.is_write() {
                writers.insert(record.txid);
                if self.is_committed(record.txid) {
                    writes_replayed += 1;
                } else {
                    writes_ignored += 1;
                }
            }
        }

        let uncommitted = writers
            .iter()
            .filter(|txid| !self.is_committed(**txid))
            .count();

        RecoveryReport {
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            records_scanned: self.records.len() as u64,
            committed_transactions: self.committed.len() as u64,
            uncommitted_transactions: uncommitted as u64,
            writes_replayed,
            writes_ignored,
            max_txid,
        }
    }

    /// Applies every committed write in log order.
    ///
    /// Each write replaces the key's entry in `table`, its tag is registered
    /// outstanding in `tracker`, and it is queued again on `store`. A later
    /// write to the same key wins.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a write cannot be queued.
    pub fn replay(
        &self,
        table: &mut VisibleTable,
        tracker: &mut DurabilityTracker,
        store: &mut dyn StorageDevice,
    ) -> CoreResult<RecoveryReport> {
        for (tag, record) in self.committed_writes() {
            tracker.register(tag);
            table.apply(record.key, tag, record.value.clone());
            store.queue_write(record.key, tag, record.value.clone())?;
        }
        Ok(self.report())
    }
}

/// Returns the ids of all transactions with a COMMIT record.
fn classify(records: &[(Tag, LogRecord)]) -> HashSet<TransactionId> {
    records
        .iter()
        .filter(|(_, record)| record.is_commit())
        .map(|(_, record)| record.txid)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::Key;
    use walkv_storage::{InMemoryLog, InMemoryStore};

    fn append(log: &mut InMemoryLog, record: LogRecord) -> Tag {
        Tag::new(log.append(&record.encode().unwrap()).unwrap())
    }

    fn write(txid: u64, key: u64, value: &[u8]) -> LogRecord {
        LogRecord::write(TransactionId::new(txid), Key::new(key), value.to_vec())
    }

    fn commit(txid: u64) -> LogRecord {
        LogRecord::commit(TransactionId::new(txid))
    }

    #[test]
    fn empty_log_recovers_nothing() {
        let log = InMemoryLog::new();
        let scan = RecoveryScan::read(&log).unwrap();

        assert!(scan.records().is_empty());
        assert_eq!(scan.report(), RecoveryReport::default());
    }

    #[test]
    fn commit_after_interleaved_writes_is_found() {
        let mut log = InMemoryLog::new();
        append(&mut log, write(1, 10, b"a"));
        append(&mut log, write(2, 20, b"b"));
        append(&mut log, write(1, 11, b"c"));
        append(&mut log, commit(2));
        append(&mut log, commit(1));

        let scan = RecoveryScan::read(&log).unwrap();
        assert!(scan.is_committed(TransactionId::new(1)));
        assert!(scan.is_committed(TransactionId::new(2)));
        assert_eq!(scan.committed_writes().count(), 3);
    }

    #[test]
    fn uncommitted_writes_are_ignored() {
        let mut log = InMemoryLog::new();
        append(&mut log, write(3, 7, b"x"));
        append(&mut log, commit(3));
        append(&mut log, write(4, 9, b"y"));

        let scan = RecoveryScan::read(&log).unwrap();
        let mut table = VisibleTable::new();
        let mut tracker = DurabilityTracker::new();
        let mut store = InMemoryStore::new();

        let report = scan.replay(&mut table, &mut tracker, &mut store).unwrap();

        assert_eq!(table.value(Key::new(7)), Some(&b"x"[..]));
        assert!(table.value(Key::new(9)).is_none());
        assert_eq!(report.writes_replayed, 1);
        assert_eq!(report.writes_ignored, 1);
        assert_eq!(report.committed_transactions, 1);
        assert_eq!(report.uncommitted_transactions, 1);
        assert_eq!(report.max_txid, Some(TransactionId::new(4)));
    }

    #[test]
    fn replay_registers_tags_and_requeues() {
        let mut log = InMemoryLog::new();
        let tag = append(&mut log, write(1, 42, b"a"));
        append(&mut log, commit(1));

        let scan = RecoveryScan::read(&log).unwrap();
        let mut table = VisibleTable::new();
        let mut tracker = DurabilityTracker::new();
        let mut store = InMemoryStore::new();
        scan.replay(&mut table, &mut tracker, &mut store).unwrap();

        assert!(tracker.contains(tag));
        assert_eq!(store.pending(), 1);
        assert_eq!(store.persist_next().unwrap().tag, tag);
    }

    #[test]
    fn last_write_wins_by_log_order() {
        let mut log = InMemoryLog::new();
        append(&mut log, write(1, 5, b"first"));
        append(&mut log, commit(1));
        let second = append(&mut log, write(2, 5, b"second"));
        append(&mut log, commit(2));

        let scan = RecoveryScan::read(&log).unwrap();
        let mut table = VisibleTable::new();
        scan.replay(&mut table, &mut DurabilityTracker::new(), &mut InMemoryStore::new())
            .unwrap();

        let entry = table.get(Key::new(5)).unwrap();
        assert_eq!(entry.value, b"second");
        assert_eq!(entry.tag, second);
    }

    #[test]
    fn scan_respects_truncation_offset() {
        let mut log = InMemoryLog::new();
        append(&mut log, write(1, 1, b"old"));
        append(&mut log, commit(1));
        let start = append(&mut log, write(2, 2, b"new"));
        append(&mut log, commit(2));
        log.set_truncation_offset(start.offset()).unwrap();

        let scan = RecoveryScan::read(&log).unwrap();
        let report = scan.report();
        assert_eq!(report.start_offset, start.offset());
        assert_eq!(report.records_scanned, 2);
        assert!(!scan.is_committed(TransactionId::new(1)));
    }

    #[test]
    fn malformed_record_is_fatal() {
        let mut log = InMemoryLog::new();
        append(&mut log, write(1, 1, b"a"));
        append(&mut log, commit(1));
        log.append(&[0, 0, 0]).unwrap();

        let result = RecoveryScan::read(&log);
        assert!(matches!(result, Err(CoreError::MalformedRecord { .. })));
    }
}
