//! Per-transaction write buffer.

use crate::types::{Key, TransactionId};
use crate::wal::LogRecord;

/// A pending write, not yet visible to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritesetEntry {
    /// Target key.
    pub key: Key,
    /// New value.
    pub value: Vec<u8>,
}

/// Staging area for an active transaction.
///
/// Holds the WRITE records to be logged at commit and, in the same order,
/// the writes to apply once they are logged. The two sequences stay
/// parallel: `records[i]` is the log record for `writeset[i]`.
#[derive(Debug, Clone)]
pub struct TransactionBuffer {
    txid: TransactionId,
    records: Vec<LogRecord>,
    writeset: Vec<WritesetEntry>,
}

impl TransactionBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(txid: TransactionId) -> Self {
        Self {
            txid,
            records: Vec::new(),
            writeset: Vec::new(),
        }
    }

    /// Returns the owning transaction id.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        self.txid
    }

    /// Buffers a write.
    pub fn write(&mut self, key: Key, value: Vec<u8>) {
        self.records
            .push(LogRecord::write(self.txid, key, value.clone()));
        self.writeset.push(WritesetEntry { key, value });
    }

    /// Returns the number of buffered writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writeset.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writeset.is_empty()
    }

    /// Returns the buffered WRITE records.
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Returns the buffered writes.
    #[must_use]
    pub fn writeset(&self) -> &[WritesetEntry] {
        &self.writeset
    }

    /// Closes the buffer with a COMMIT record.
    #[must_use]
    pub fn into_commit_batch(self) -> CommitBatch {
        let mut records = self.records;
        records.push(LogRecord::commit(self.txid));
        CommitBatch {
            txid: self.txid,
            records,
            writeset: self.writeset,
        }
    }
}

/// The log records and writes of one committing transaction.
///
/// `records` holds one WRITE per writeset entry, in order, then the COMMIT.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    /// Committing transaction.
    pub txid: TransactionId,
    /// Records to append, COMMIT last.
    pub records: Vec<LogRecord>,
    /// Writes to apply once the records are logged.
    pub writeset: Vec<WritesetEntry>,
}

impl CommitBatch {
    /// Returns the total encoded size of the batch.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(LogRecord::encoded_len).sum()
    }
}
