//! WAL writer.

use crate::error::CoreResult;
use crate::types::Tag;
use crate::wal::record::LogRecord;
use crate::wal::scanner::LogScanner;
use walkv_storage::LogDevice;

/// Owns the log device and speaks records to it.
///
/// The `WalManager` turns records into appended bytes and offsets into
/// tags, and keeps the truncation offset moving forward only.
pub struct WalManager {
    /// Log device holding the WAL bytes.
    log: Box<dyn LogDevice>,
}

impl WalManager {
    /// Creates a new WAL manager over a log device.
    pub fn new(log: Box<dyn LogDevice>) -> Self {
        Self { log }
    }

    /// Appends a record and returns its tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the append fails.
    pub fn append(&mut self, record: &LogRecord) -> CoreResult<Tag> {
        let data = record.encode()?;
        let offset = self.log.append(&data)?;
        Ok(Tag::new(offset))
    }

    /// Appends records in order and returns their tags in the same order.
    ///
    /// Every record is encoded before the first append, so an encoding
    /// failure performs no I/O. An append failure part way through leaves
    /// the earlier records in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be encoded or appended.
    pub fn append_batch(&mut self, records: &[LogRecord]) -> CoreResult<Vec<Tag>> {
        let encoded = records
            .iter()
            .map(LogRecord::encode)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut tags = Vec::with_capacity(encoded.len());
        for data in &encoded {
            tags.push(Tag::new(self.log.append(data)?));
        }
        Ok(tags)
    }

    /// Makes every appended record durable.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.log.sync()?;
        Ok(())
    }

    /// Returns the current truncation offset.
    #[must_use]
    pub fn truncation_offset(&self) -> u64 {
        self.log.truncation_offset()
    }

    /// Returns the current end offset.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.log.end_offset()
    }

    /// Moves the truncation offset forward to `offset`.
    ///
    /// Targets at or below the current truncation offset are ignored.
    /// Returns whether the offset moved.
    pub fn advance_truncation(&mut self, offset: u64) -> CoreResult<bool> {
        if offset <= self.log.truncation_offset() {
            return Ok(false);
        }
        self.log.set_truncation_offset(offset)?;
        Ok(true)
    }

    /// Returns the underlying log device.
    #[must_use]
    pub fn device(&self) -> &dyn LogDevice {
        &*self.log
    }

    /// Returns a scanner over every record from the truncation offset on.
    pub fn scan(&self) -> LogScanner<'_> {
        LogScanner::new(&*self.log)
    }

    /// Consumes the manager and returns the log device.
    #[must_use]
    pub fn into_device(self) -> Box<dyn LogDevice> {
        self.log
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("truncation_offset", &self.truncation_offset())
            .field("end_offset", &self.end_offset())
            .finish_non_exhaustive()
    }
}
