//! Visible-state table.
//!
//! Maps each key to its latest committed value. Reads consult only this
//! table, so a key never shows a value from a transaction that has not
//! committed.

use crate::types::{Key, Tag, TaggedValue};
use std::collections::HashMap;

/// The latest committed `(tag, value)` for every key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleTable {
    entries: HashMap<Key, TaggedValue>,
}

impl VisibleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table from the storage device's durable snapshot.
    #[must_use]
    pub fn from_stored(entries: HashMap<Key, TaggedValue>) -> Self {
        Self { entries }
    }

    /// Returns the committed value and tag for `key`.
    #[must_use]
    pub fn get(&self, key: Key) -> Option<&TaggedValue> {
        self.entries.get(&key)
    }

    /// Returns the committed value for `key`.
    #[must_use]
    pub fn value(&self, key: Key) -> Option<&[u8]> {
        self.entries.get(&key).map(|tv| tv.value.as_slice())
    }

    /// Records a committed write. Later calls for a key replace earlier ones.
    pub fn apply(&mut self, key: Key, tag: Tag, value: Vec<u8>) {
        self.entries.insert(key, TaggedValue::new(tag, value));
    }

    /// Returns the number of keys with a committed value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key has a committed value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all committed entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &TaggedValue)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_absent() {
        let table = VisibleTable::new();
        assert!(table.value(Key::new(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn apply_replaces_previous_value() {
        let mut table = VisibleTable::new();
        table.apply(Key::new(42), Tag::new(0), b"a".to_vec());
        table.apply(Key::new(42), Tag::new(49), b"b".to_vec());

        assert_eq!(table.value(Key::new(42)), Some(&b"b"[..]));
        assert_eq!(table.get(Key::new(42)).unwrap().tag, Tag::new(49));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn from_stored_seeds_entries() {
        let mut stored = HashMap::new();
        stored.insert(Key::new(7), TaggedValue::new(Tag::new(24), b"x".to_vec()));

        let table = VisibleTable::from_stored(stored);
        assert_eq!(table.value(Key::new(7)), Some(&b"x"[..]));
        assert_eq!(table.iter().count(), 1);
    }
}
