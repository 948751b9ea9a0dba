//! # walkv storage
//!
//! Device abstractions consumed by the walkv transaction core.
//!
//! Two devices sit underneath the core:
//!
//! - a **log device** ([`LogDevice`]): an append-only byte log with
//!   random-offset reads, a durable end offset and a truncation offset
//!   below which bytes may be discarded;
//! - a **storage device** ([`StorageDevice`]): the key/value engine that
//!   persists individual writes asynchronously and reports them back once
//!   they are durable.
//!
//! ## Design Principles
//!
//! - The log device is an **opaque byte store**: it never interprets
//!   record bytes, it only hands out offsets.
//! - Offsets are logical and stable. Truncation never renumbers the log.
//! - The storage device never calls back into the core. Whoever drives it
//!   collects [`PersistedWrite`]s and forwards them.
//!
//! ## Available Devices
//!
//! - [`InMemoryLog`] - shared in-memory log, for tests and crash simulation
//! - [`FileLog`] - single-file persistent log
//! - [`InMemoryStore`] - queued key/value store with manual persistence
//!
//! ## Example
//!
//! ```rust
//! use walkv_storage::{InMemoryLog, LogDevice};
//!
//! let mut log = InMemoryLog::new();
//! let offset = log.append(b"hello world").unwrap();
//! let data = log.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod log;
mod store;
mod types;

pub use error::{StorageError, StorageResult};
pub use log::{FileLog, InMemoryLog, LogDevice, FILE_LOG_HEADER_SIZE};
pub use store::{InMemoryStore, StorageDevice};
pub use types::{Key, PersistedWrite, Tag, TaggedValue};
