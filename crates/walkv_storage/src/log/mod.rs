//! Log device trait and implementations.

mod file;
mod memory;

pub use file::{FileLog, FILE_LOG_HEADER_SIZE};
pub use memory::InMemoryLog;

use crate::error::StorageResult;

/// An append-only byte log with a movable truncation point.
///
/// Log devices are **opaque byte stores**. They hand out offsets for
/// appended bytes and serve random-offset reads; they never interpret the
/// records written into them.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at, which is the end
///   offset before the call
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `truncation_offset <= end_offset`, and the truncation offset never
///   decreases
/// - offsets are never renumbered: truncation only makes bytes below the
///   truncation offset unreadable
/// - after `sync` returns, every appended byte survives process termination
pub trait LogDevice: Send {
    /// Appends data at the end of the log and returns its starting offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the end offset
    /// - The offset lies below the truncation offset
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns the earliest offset still needed for recovery.
    fn truncation_offset(&self) -> u64;

    /// Moves the truncation offset forward.
    ///
    /// Setting the current value again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::InvalidTruncation`] if `offset` is below
    /// the current truncation offset or beyond the end offset.
    fn set_truncation_offset(&mut self, offset: u64) -> StorageResult<()>;

    /// Returns the offset the next `append` will write at.
    fn end_offset(&self) -> u64;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;
}
