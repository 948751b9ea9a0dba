//! Write-Ahead Log (WAL) for durability and crash recovery.
//!
//! Every committed write reaches the log before it becomes visible to
//! readers or is handed to the storage device. On restart, the log is
//! scanned from its truncation offset and committed writes are replayed.
//!
//! ## Record Format
//!
//! ```text
//! | size (4) | txn_id (8) | key (8) | kind (4) | value (N) |
//! ```
//!
//! Records are self-describing: the size field covers the header, so a
//! scanner can walk the log by reading a 4-byte prefix, then the whole
//! record, then advancing by its size. There is no separate framing.
//!
//! ## Scan Policy
//!
//! Any record that cannot be decoded, including a record whose declared
//! size runs past the end of the log, is **fatal**. Offsets are derived
//! from earlier sizes, so there is nothing to resynchronise on.
//!
//! ## Invariants
//!
//! - the log is **append-only**; records are never modified after append
//! - a record's tag is the offset it was appended at
//! - the truncation offset only moves forward

mod record;
mod scanner;
mod writer;

pub use record::{
    peek_size, LogRecord, RecordKind, HEADER_SIZE, MAX_VALUE_SIZE, SIZE_PREFIX_LEN,
};
pub use scanner::LogScanner;
pub use writer::WalManager;
