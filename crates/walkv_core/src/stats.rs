//! Transaction statistics.
//!
//! Counters only ever increase. Read them through
//! [`TransactionStats`], a plain snapshot.

/// Live counters kept by the transaction manager.
///
/// Only the manager updates them, always through `&mut self`.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    started: u64,
    committed: u64,
    aborted: u64,
    log_records: u64,
    log_bytes: u64,
    confirmations: u64,
    truncations: u64,
}

impl StatsCounters {
    pub(crate) fn record_start(&mut self) {
        self.started += 1;
    }

    pub(crate) fn record_commit(&mut self) {
        self.committed += 1;
    }

    pub(crate) fn record_abort(&mut self) {
        self.aborted += 1;
    }

    pub(crate) fn record_append(&mut self, records: u64, bytes: u64) {
        self.log_records += records;
        self.log_bytes += bytes;
    }

    pub(crate) fn record_confirmation(&mut self) {
        self.confirmations += 1;
    }

    pub(crate) fn record_truncation(&mut self) {
        self.truncations += 1;
    }

    pub(crate) fn snapshot(&self) -> TransactionStats {
        TransactionStats {
            transactions_started: self.started,
            transactions_committed: self.committed,
            transactions_aborted: self.aborted,
            log_records_appended: self.log_records,
            log_bytes_appended: self.log_bytes,
            persist_confirmations: self.confirmations,
            truncation_advances: self.truncations,
        }
    }
}

/// A point-in-time snapshot of transaction statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionStats {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted, including those whose commit failed.
    pub transactions_aborted: u64,
    /// Log records appended by commits.
    pub log_records_appended: u64,
    /// Log bytes appended by commits.
    pub log_bytes_appended: u64,
    /// Persistence confirmations received.
    pub persist_confirmations: u64,
    /// Times the truncation offset moved forward.
    pub truncation_advances: u64,
}
