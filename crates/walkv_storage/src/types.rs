//! Vocabulary shared by the devices and the transaction core.

use std::fmt;

/// A key in the flat key/value mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub u64);

impl Key {
    /// Placeholder key carried by records that do not target a key.
    pub const COMMIT_SENTINEL: Key = Key(u64::MAX);

    /// Creates a new key.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.0)
    }
}

/// Log offset of a write record.
///
/// A tag correlates "this value was durably logged" with "this value was
/// durably applied to storage". Tags for a single key increase with its
/// write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u64);

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Returns the log offset this tag refers to.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag:{}", self.0)
    }
}

/// The most recent value known for a key with the tag that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedValue {
    /// Tag of the log record that produced `value`.
    pub tag: Tag,
    /// The value bytes.
    pub value: Vec<u8>,
}

impl TaggedValue {
    /// Creates a new tagged value.
    #[must_use]
    pub fn new(tag: Tag, value: Vec<u8>) -> Self {
        Self { tag, value }
    }
}

/// A queued write the storage device has made durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedWrite {
    /// Key that was written.
    pub key: Key,
    /// Tag the write was queued under.
    pub tag: Tag,
    /// Value that was written.
    pub value: Vec<u8>,
}
