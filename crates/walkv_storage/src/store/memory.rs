//! In-memory storage device with manually driven persistence.

use crate::error::StorageResult;
use crate::store::StorageDevice;
use crate::types::{Key, PersistedWrite, Tag, TaggedValue};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StoreState {
    /// Writes that are durable.
    persisted: HashMap<Key, TaggedValue>,
    /// Writes queued but not yet durable, oldest first.
    queue: VecDeque<PersistedWrite>,
}

impl StoreState {
    fn persist(&mut self, write: &PersistedWrite) {
        self.persisted
            .insert(write.key, TaggedValue::new(write.tag, write.value.clone()));
    }
}

/// An in-memory storage device.
///
/// Queued writes stay pending until the driver makes them durable with
/// [`persist_next`](Self::persist_next), [`persist_key`](Self::persist_key)
/// or [`persist_all`](Self::persist_all). Each of those returns the writes
/// that became durable so they can be forwarded to the transaction core.
///
/// Like [`crate::InMemoryLog`], clones share state, and
/// [`crash`](Self::crash) drops every write that was not yet durable.
///
/// # Example
///
/// ```rust
/// use walkv_storage::{InMemoryStore, Key, StorageDevice, Tag};
///
/// let mut store = InMemoryStore::new();
/// store.queue_write(Key::new(1), Tag::new(0), b"a".to_vec()).unwrap();
/// assert_eq!(store.pending(), 1);
///
/// let done = store.persist_all();
/// assert_eq!(done.len(), 1);
/// assert_eq!(store.read_stored_table().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose durable table is pre-populated.
    #[must_use]
    pub fn with_table(persisted: HashMap<Key, TaggedValue>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                persisted,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Returns the number of queued writes that are not durable yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Makes the oldest queued write durable.
    pub fn persist_next(&self) -> Option<PersistedWrite> {
        let mut state = self.state.lock();
        let write = state.queue.pop_front()?;
        state.persist(&write);
        Some(write)
    }

    /// Makes the oldest queued write for `key` durable.
    ///
    /// Other keys' writes are left in place, so confirmations can arrive
    /// out of log order across keys while staying ordered per key.
    pub fn persist_key(&self, key: Key) -> Option<PersistedWrite> {
        let mut state = self.state.lock();
        let index = state.queue.iter().position(|w| w.key == key)?;
        let write = state.queue.remove(index)?;
        state.persist(&write);
        Some(write)
    }

    /// Makes every queued write durable, oldest first.
    pub fn persist_all(&self) -> Vec<PersistedWrite> {
        let mut state = self.state.lock();
        let writes: Vec<PersistedWrite> = state.queue.drain(..).collect();
        for write in &writes {
            state.persist(write);
        }
        writes
    }

    /// Drops every write that was not yet durable.
    ///
    /// Returns the number of writes lost.
    pub fn crash(&self) -> usize {
        let mut state = self.state.lock();
        let lost = state.queue.len();
        state.queue.clear();
        lost
    }
}

impl StorageDevice for InMemoryStore {
    fn read_stored_table(&self) -> StorageResult<HashMap<Key, TaggedValue>> {
        Ok(self.state.lock().persisted.clone())
    }

    fn queue_write(&mut self, key: Key, tag: Tag, value: Vec<u8>) -> StorageResult<()> {
        self.state
            .lock()
            .queue
            .push_back(PersistedWrite { key, tag, value });
        Ok(())
    }
}
