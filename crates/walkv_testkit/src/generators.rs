//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, logs and workloads that
//! respect the caller contract: transaction ids increase and every key
//! is drawn from a small space so writes collide.

use proptest::prelude::*;
use walkv_core::wal::LogRecord;
use walkv_core::{Key, TransactionId};
use walkv_storage::{InMemoryLog, LogDevice};

/// Strategy for generating keys from a small space.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    (0u64..16).prop_map(Key::new)
}

/// Strategy for generating values (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for generating a transaction's writes.
pub fn writeset_strategy() -> impl Strategy<Value = Vec<(Key, Vec<u8>)>> {
    prop::collection::vec((key_strategy(), value_strategy()), 0..6)
}

/// Strategy for generating single log records of either kind.
pub fn record_strategy() -> impl Strategy<Value = LogRecord> {
    prop_oneof![
        (any::<u64>(), any::<u64>(), value_strategy()).prop_map(|(txid, key, value)| {
            LogRecord::write(TransactionId::new(txid), Key::new(key), value)
        }),
        any::<u64>().prop_map(|txid| LogRecord::commit(TransactionId::new(txid))),
    ]
}

/// A transaction as it appears in a generated log.
#[derive(Debug, Clone)]
pub struct LoggedTransaction {
    /// Transaction id.
    pub txid: TransactionId,
    /// Writes in order.
    pub writes: Vec<(Key, Vec<u8>)>,
    /// Whether a COMMIT record follows the writes.
    pub committed: bool,
}

impl LoggedTransaction {
    /// Returns the records of this transaction, COMMIT last if committed.
    pub fn records(&self) -> Vec<LogRecord> {
        let mut records: Vec<LogRecord> = self
            .writes
            .iter()
            .map(|(key, value)| LogRecord::write(self.txid, *key, value.clone()))
            .collect();
        if self.committed {
            records.push(LogRecord::commit(self.txid));
        }
        records
    }
}

/// Strategy for generating a log of interleaved transactions.
///
/// Each transaction's records keep their relative order, but records of
/// different transactions are shuffled together, and some transactions
/// never commit.
pub fn interleaved_log_strategy() -> impl Strategy<Value = (Vec<LoggedTransaction>, Vec<LogRecord>)>
{
    prop::collection::vec((writeset_strategy(), prop::bool::weighted(0.7)), 1..8)
        .prop_map(|txns| {
            txns.into_iter()
                .enumerate()
                .map(|(i, (writes, committed))| LoggedTransaction {
                    txid: TransactionId::new(i as u64 + 1),
                    writes,
                    committed,
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|txns| {
            let total: usize = txns.iter().map(|t| t.records().len()).sum();
            let picks = prop::collection::vec(any::<prop::sample::Index>(), total);
            (Just(txns), picks)
        })
        .prop_map(|(txns, picks)| {
            let mut queues: Vec<std::collections::VecDeque<LogRecord>> =
                txns.iter().map(|t| t.records().into()).collect();
            let mut log = Vec::new();
            for pick in picks {
                let live: Vec<usize> = (0..queues.len()).filter(|&i| !queues[i].is_empty()).collect();
                let chosen = live[pick.index(live.len())];
                if let Some(record) = queues[chosen].pop_front() {
                    log.push(record);
                }
            }
            (txns, log)
        })
}

/// Appends encoded records to a fresh in-memory log.
///
/// # Panics
///
/// Panics if a record cannot be encoded.
pub fn log_from_records(records: &[LogRecord]) -> InMemoryLog {
    let mut log = InMemoryLog::new();
    for record in records {
        let bytes = record.encode().expect("generated record must encode");
        log.append(&bytes).expect("in-memory append cannot fail");
    }
    log
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum WorkloadOp {
    /// Run a transaction and commit it.
    Commit(Vec<(Key, Vec<u8>)>),
    /// Run a transaction and abort it.
    Abort(Vec<(Key, Vec<u8>)>),
    /// Persist the oldest queued write for a key.
    PersistKey(Key),
    /// Persist every queued write.
    PersistAll,
    /// Crash and recover.
    Crash,
}

/// Strategy for generating a single workload step.
pub fn workload_op_strategy() -> impl Strategy<Value = WorkloadOp> {
    prop_oneof![
        5 => writeset_strategy().prop_map(WorkloadOp::Commit),
        1 => writeset_strategy().prop_map(WorkloadOp::Abort),
        3 => key_strategy().prop_map(WorkloadOp::PersistKey),
        1 => Just(WorkloadOp::PersistAll),
        1 => Just(WorkloadOp::Crash),
    ]
}

/// Strategy for generating a workload.
pub fn workload_strategy(max_ops: usize) -> impl Strategy<Value = Vec<WorkloadOp>> {
    prop::collection::vec(workload_op_strategy(), 1..max_ops.max(2))
}
