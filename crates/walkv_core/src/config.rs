//! Transaction manager configuration.

use crate::wal::MAX_VALUE_SIZE;

/// Configuration for a transaction manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to sync the log device once per commit, after the batch
    /// append (safer but slower).
    pub sync_on_commit: bool,

    /// Largest value `write` accepts. Clamped to what a log record can
    /// describe.
    pub max_value_size: usize,

    /// Whether persistence confirmations advance the log truncation offset.
    pub truncate_on_persist: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            max_value_size: 16 * 1024 * 1024, // 16 MB
            truncate_on_persist: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the largest accepted value size.
    #[must_use]
    pub const fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Sets whether persistence confirmations advance truncation.
    #[must_use]
    pub const fn truncate_on_persist(mut self, value: bool) -> Self {
        self.truncate_on_persist = value;
        self
    }

    /// Returns the value size limit actually enforced.
    #[must_use]
    pub fn effective_max_value_size(&self) -> usize {
        self.max_value_size.min(MAX_VALUE_SIZE)
    }
}
