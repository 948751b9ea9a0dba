//! Error types for the transaction core.

use crate::types::{Tag, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in transaction core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log or storage device error.
    #[error("storage error: {0}")]
    Storage(#[from] walkv_storage::StorageError),

    /// The transaction id has no active buffer.
    ///
    /// Raised for operations on ids that were never started, or that
    /// already committed or aborted. Local to the call.
    #[error("unknown transaction {txid}")]
    UnknownTransaction {
        /// The transaction id the caller used.
        txid: TransactionId,
    },

    /// A log record could not be decoded.
    ///
    /// Fatal during recovery: later offsets depend on earlier sizes, so
    /// nothing past the bad record can be trusted.
    #[error("malformed log record: {message}")]
    MalformedRecord {
        /// Description of the defect.
        message: String,
    },

    /// Truncation was asked to pass a tag that is still outstanding.
    #[error("truncation to offset {requested} would pass outstanding {min_outstanding}")]
    TruncationViolation {
        /// The offset truncation was asked to advance to.
        requested: u64,
        /// The smallest tag not yet confirmed durable.
        min_outstanding: Tag,
    },

    /// A log sync failed after a commit batch was appended.
    ///
    /// Whether that batch is durable is unknown, so the manager refuses
    /// further work until it is reopened and recovery settles the log.
    #[error("log sync failed after commit of {txid}; reopen to recover")]
    Poisoned {
        /// The transaction whose commit could not be synced.
        txid: TransactionId,
    },

    /// A value is too large to be logged.
    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge {
        /// Size of the rejected value.
        size: usize,
        /// Largest accepted value size.
        max: usize,
    },
}

impl CoreError {
    /// Creates an unknown transaction error.
    pub fn unknown_transaction(txid: TransactionId) -> Self {
        Self::UnknownTransaction { txid }
    }

    /// Creates a malformed record error.
    pub fn malformed_record(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }

    /// Creates a poisoned error.
    pub fn poisoned(txid: TransactionId) -> Self {
        Self::Poisoned { txid }
    }

    /// Creates a value too large error.
    pub fn value_too_large(size: usize, max: usize) -> Self {
        Self::ValueTooLarge { size, max }
    }

    /// Attaches the log offset a malformed record was read from.
    ///
    /// Other errors are returned unchanged.
    #[must_use]
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            Self::MalformedRecord { message } => Self::MalformedRecord {
                message: format!("at offset {offset}: {message}"),
            },
            other => other,
        }
    }

    /// Returns true if recovery cannot proceed past this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. } | Self::Storage(_) | Self::Poisoned { .. }
        )
    }
}
