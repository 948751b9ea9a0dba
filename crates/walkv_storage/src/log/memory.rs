//! In-memory log device.

use crate::error::{StorageError, StorageResult};
use crate::log::LogDevice;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct LogState {
    /// Logical offset of `data[0]`; equal to the truncation offset.
    base: u64,
    /// Bytes from the truncation offset to the end of the log.
    data: Vec<u8>,
}

impl LogState {
    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }
}

/// An in-memory log device.
///
/// Cloning an `InMemoryLog` yields another handle to the **same** log. A
/// test can keep one handle while the transaction manager owns another; the
/// log then outlives the manager the way a disk outlives a process, which is
/// what crash-recovery tests need.
///
/// Advancing the truncation offset discards the bytes before it.
///
/// # Example
///
/// ```rust
/// use walkv_storage::{InMemoryLog, LogDevice};
///
/// let mut log = InMemoryLog::new();
/// let survivor = log.clone();
/// log.append(b"test data").unwrap();
/// drop(log);
/// assert_eq!(survivor.end_offset(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    state: Arc<RwLock<LogState>>,
}

impl InMemoryLog {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log whose bytes start at offset 0.
    ///
    /// Useful for building recovery scenarios by hand.
    #[must_use]
    pub fn with_bytes(data: Vec<u8>) -> Self {
        Self {
            state: Arc::new(RwLock::new(LogState { base: 0, data })),
        }
    }

    /// Returns a copy of the bytes still retained above the truncation offset.
    #[must_use]
    pub fn retained_bytes(&self) -> Vec<u8> {
        self.state.read().data.clone()
    }

    /// Returns the number of bytes still retained.
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.state.read().data.len()
    }

    /// Overwrites one retained byte in place.
    ///
    /// Simulates media corruption. Offsets outside the retained range are
    /// ignored.
    pub fn corrupt_byte(&self, offset: u64, byte: u8) {
        let mut state = self.state.write();
        if offset < state.base {
            return;
        }
        let index = (offset - state.base) as usize;
        if let Some(slot) = state.data.get_mut(index) {
            *slot = byte;
        }
    }
}

impl LogDevice for InMemoryLog {
    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.write();
        let offset = state.end();
        state.data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.state.read();
        let end = state.end();

        if offset < state.base {
            return Err(StorageError::ReadBelowTruncation {
                offset,
                truncation: state.base,
            });
        }
        if offset.saturating_add(len as u64) > end {
            return Err(StorageError::ReadPastEnd { offset, len, end });
        }

        let start = (offset - state.base) as usize;
        Ok(state.data[start..start + len].to_vec())
    }

    fn truncation_offset(&self) -> u64 {
        self.state.read().base
    }

    fn set_truncation_offset(&mut self, offset: u64) -> StorageResult<()> {
        let mut state = self.state.write();
        let end = state.end();

        if offset < state.base || offset > end {
            return Err(StorageError::InvalidTruncation {
                requested: offset,
                current: state.base,
                end,
            });
        }

        let discard = (offset - state.base) as usize;
        state.data.drain(..discard);
        state.base = offset;
        Ok(())
    }

    fn end_offset(&self) -> u64 {
        self.state.read().end()
    }

    fn sync(&mut self) -> StorageResult<()> {
        // Nothing is buffered outside the shared state
        Ok(())
    }
}
