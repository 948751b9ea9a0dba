//! Transaction management.
//!
//! Transactions buffer their writes in memory and touch the log only at
//! commit, as one batch: the WRITE records followed by a COMMIT record.
//! Abort is a pure in-memory discard.

mod buffer;
mod manager;

pub use buffer::{CommitBatch, TransactionBuffer, WritesetEntry};
pub use manager::TransactionManager;
