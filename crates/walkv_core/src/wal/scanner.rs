//! Sequential log scanner.

use crate::error::{CoreError, CoreResult};
use crate::types::Tag;
use crate::wal::record::{peek_size, LogRecord, HEADER_SIZE, SIZE_PREFIX_LEN};
use walkv_storage::LogDevice;

/// An iterator over the records between two log offsets.
///
/// Each step reads the size prefix, reads the whole record, decodes it and
/// yields it together with its offset as a [`Tag`]. The iterator is fused:
/// after the first error it yields nothing more.
///
/// # Example
///
/// ```
/// use walkv_core::wal::{LogRecord, LogScanner};
/// use walkv_core::TransactionId;
/// use walkv_storage::{InMemoryLog, LogDevice};
///
/// let mut log = InMemoryLog::new();
/// log.append(&LogRecord::commit(TransactionId::new(1)).encode().unwrap()).unwrap();
///
/// let records: Vec<_> = LogScanner::new(&log).collect::<Result<_, _>>().unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub struct LogScanner<'a> {
    log: &'a dyn LogDevice,
    cursor: u64,
    end: u64,
    finished: bool,
}

impl<'a> LogScanner<'a> {
    /// Creates a scanner from the log's truncation offset to its end offset.
    pub fn new(log: &'a dyn LogDevice) -> Self {
        let start = log.truncation_offset();
        Self::from_offset(log, start)
    }

    /// Creates a scanner from `start` to the log's end offset.
    ///
    /// `start` must sit on a record boundary.
    pub fn from_offset(log: &'a dyn LogDevice, start: u64) -> Self {
        Self {
            log,
            cursor: start,
            end: log.end_offset(),
            finished: false,
        }
    }

    /// Returns the offset of the next record to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Returns the offset the scan stops at.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    fn read_next(&mut self) -> CoreResult<(Tag, LogRecord)> {
        let offset = self.cursor;
        let remaining = self.end - offset;

        if remaining < SIZE_PREFIX_LEN as u64 {
            return Err(CoreError::malformed_record(format!(
                "{remaining} trailing bytes cannot hold a size prefix"
            )));
        }

        let prefix = self.log.read_at(offset, SIZE_PREFIX_LEN)?;
        let size = peek_size(&prefix)?;

        // A zero or undersized record would never advance the cursor
        if size < HEADER_SIZE {
            return Err(CoreError::malformed_record(format!(
                "declared size {size} is smaller than the {HEADER_SIZE}-byte header"
            )));
        }
        if size as u64 > remaining {
            return Err(CoreError::malformed_record(format!(
                "declared size {size} runs past end of log at {}",
                self.end
            )));
        }

        let bytes = self.log.read_at(offset, size)?;
        let record = LogRecord::decode(&bytes)?;
        self.cursor += size as u64;

        Ok((Tag::new(offset), record))
    }
}

impl Iterator for LogScanner<'_> {
    type Item = CoreResult<(Tag, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.cursor >= self.end {
            return None;
        }

        let offset = self.cursor;
        match self.read_next() {
            Ok(item) => Some(Ok(item)),
            Err(err) => {
                self.finished = true;
                Some(Err(err.at_offset(offset)))
            }
        }
    }
}

impl std::fmt::Debug for LogScanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogScanner")
            .field("cursor", &self.cursor)
            .field("end", &self.end)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
