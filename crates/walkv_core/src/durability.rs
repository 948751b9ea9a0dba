//! Durability tracking and the log truncation rule.
//!
//! A write is *outstanding* from the moment it is applied to the visible
//! table until the storage device confirms it durable. Until then recovery
//! may need to re-derive it from the log, so the log must not be truncated
//! past it.
//!
//! The outstanding set is ordered by tag. Confirmations may arrive out of
//! log order across keys; truncation always follows the true minimum
//! outstanding tag rather than the order confirmations happen to arrive in.

use crate::error::{CoreError, CoreResult};
use crate::types::Tag;
use std::collections::BTreeSet;

/// Outcome of confirming a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The tag was not outstanding; nothing changed.
    NotOutstanding,
    /// The tag was removed, and a smaller tag is still outstanding.
    Removed,
    /// The tag was the minimum outstanding tag. Truncation may advance.
    RemovedMinimum,
}

/// Tracks tags whose storage-level durability is unconfirmed.
#[derive(Debug, Clone, Default)]
pub struct DurabilityTracker {
    outstanding: BTreeSet<Tag>,
}

impl DurabilityTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `tag` outstanding. Returns false if it already was.
    pub fn register(&mut self, tag: Tag) -> bool {
        self.outstanding.insert(tag)
    }

    /// Removes `tag` from the outstanding set.
    pub fn confirm(&mut self, tag: Tag) -> Confirmation {
        let was_min = self.min_outstanding() == Some(tag);
        if !self.outstanding.remove(&tag) {
            return Confirmation::NotOutstanding;
        }
        if was_min {
            Confirmation::RemovedMinimum
        } else {
            Confirmation::Removed
        }
    }

    /// Returns the smallest outstanding tag.
    #[must_use]
    pub fn min_outstanding(&self) -> Option<Tag> {
        self.outstanding.first().copied()
    }

    /// Returns true if `tag` is outstanding.
    #[must_use]
    pub fn contains(&self, tag: Tag) -> bool {
        self.outstanding.contains(&tag)
    }

    /// Returns the number of outstanding tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    /// Returns true if nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Returns the furthest offset the log may be truncated to.
    ///
    /// That is the minimum outstanding tag, or `end_offset` when every
    /// logged write is durable.
    #[must_use]
    pub fn safe_truncation(&self, end_offset: u64) -> u64 {
        self.min_outstanding()
            .map_or(end_offset, |tag| tag.offset().min(end_offset))
    }

    /// Checks that truncating to `offset` keeps every outstanding write.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TruncationViolation`] if `offset` passes the
    /// minimum outstanding tag.
    pub fn check_truncation(&self, offset: u64) -> CoreResult<()> {
        match self.min_outstanding() {
            Some(min) if offset > min.offset() => Err(CoreError::TruncationViolation {
                requested: offset,
                min_outstanding: min,
            }),
            _ => Ok(()),
        }
    }
}
