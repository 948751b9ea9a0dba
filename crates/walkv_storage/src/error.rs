//! Error types for device operations.

use std::io;
use thiserror::Error;

/// Result type for device operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a log or storage device.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the log.
    #[error("read beyond end of log: offset {offset}, len {len}, end {end}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current end offset.
        end: u64,
    },

    /// Attempted to read bytes that truncation already discarded.
    #[error("read below truncation offset: offset {offset}, truncation {truncation}")]
    ReadBelowTruncation {
        /// The requested read offset.
        offset: u64,
        /// The current truncation offset.
        truncation: u64,
    },

    /// A truncation request would move the offset backwards or past the end.
    #[error("invalid truncation to {requested}: current {current}, end {end}")]
    InvalidTruncation {
        /// The requested truncation offset.
        requested: u64,
        /// The current truncation offset.
        current: u64,
        /// The current end offset.
        end: u64,
    },

    /// The device's persistent state is corrupted.
    #[error("device corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the device.
    #[error("device locked: another process has exclusive access")]
    Locked,
}
