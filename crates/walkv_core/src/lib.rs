//! # walkv core
//!
//! The transaction core of a single-node key/value store.
//!
//! This crate provides:
//! - a write-ahead log record codec and sequential scanner ([`wal`])
//! - per-transaction write buffering, committed to the log as one batch
//! - a visible-state table holding only committed values
//! - durability tracking that decides how far the log may be truncated
//! - two-pass crash recovery (classify committed transactions, then replay)
//!
//! The log and the key/value engine are external devices, defined in
//! [`walkv_storage`].
//!
//! ## Example
//!
//! ```rust
//! use walkv_core::{Key, TransactionId, TransactionManager};
//! use walkv_storage::{InMemoryLog, InMemoryStore};
//!
//! let log = InMemoryLog::new();
//! let store = InMemoryStore::new();
//! let mut tm =
//!     TransactionManager::init_and_recover(Box::new(log.clone()), Box::new(store.clone()))
//!         .unwrap();
//!
//! tm.start(TransactionId::new(1));
//! tm.write(TransactionId::new(1), Key::new(7), b"x".to_vec()).unwrap();
//! tm.commit(TransactionId::new(1)).unwrap();
//! drop(tm);
//!
//! // Crash before the store persisted anything: the log still has it.
//! store.crash();
//! let tm = TransactionManager::init_and_recover(Box::new(log), Box::new(store)).unwrap();
//! assert_eq!(tm.read(TransactionId::new(2), Key::new(7)), Some(&b"x"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod durability;
mod error;
mod recovery;
mod stats;
mod table;
mod transaction;
mod types;
pub mod wal;

pub use config::Config;
pub use durability::{Confirmation, DurabilityTracker};
pub use error::{CoreError, CoreResult};
pub use recovery::{RecoveryReport, RecoveryScan};
pub use stats::TransactionStats;
pub use table::VisibleTable;
pub use transaction::{CommitBatch, TransactionBuffer, TransactionManager, WritesetEntry};
pub use types::{Key, PersistedWrite, Tag, TaggedValue, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
