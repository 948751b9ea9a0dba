//! Storage device trait and implementations.

mod memory;

pub use memory::InMemoryStore;

use crate::error::StorageResult;
use crate::types::{Key, Tag, TaggedValue};
use std::collections::HashMap;

/// The key/value engine underneath the transaction core.
///
/// A storage device persists individual key writes asynchronously. It
/// reports completion as [`crate::PersistedWrite`]s that the driver hands
/// to the transaction core; the device itself never calls back.
///
/// # Invariants
///
/// - every queued write is reported durable at most once
/// - writes to the same key become durable in the order they were queued
/// - `read_stored_table` reflects only durable writes
pub trait StorageDevice: Send {
    /// Returns a snapshot of everything the device has made durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored table cannot be read.
    fn read_stored_table(&self) -> StorageResult<HashMap<Key, TaggedValue>>;

    /// Schedules a durable write of `value` to `key` under `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be queued.
    fn queue_write(&mut self, key: Key, tag: Tag, value: Vec<u8>) -> StorageResult<()>;
}
