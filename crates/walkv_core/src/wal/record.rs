//! Log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{Key, TransactionId};

/// Bytes that must be read to learn a record's size.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Encoded header size.
/// size (4) + txn_id (8) + key (8) + kind (4) = 24 bytes
pub const HEADER_SIZE: usize = 24;

/// Largest value a record can carry; the size field is a `u32`.
pub const MAX_VALUE_SIZE: usize = u32::MAX as usize - HEADER_SIZE;

/// Kind of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordKind {
    /// A buffered key/value mutation.
    Write = 0,
    /// End of a transaction's durable record set.
    Commit = 1,
}

impl RecordKind {
    /// Converts a raw kind field to a record kind.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Write),
            1 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record kind to its raw field value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns the display name used by tooling.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Write => "WRITE",
            Self::Commit => "COMMIT",
        }
    }
}

/// A single write-ahead log entry.
///
/// Records carry no size field in memory: the size is derived from the
/// value length when encoding and checked against the header when
/// decoding. The tag (log offset) is not part of the record either; it is
/// known only from where the record sits in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Transaction the record belongs to.
    pub txid: TransactionId,
    /// Target key; [`Key::COMMIT_SENTINEL`] for commit markers.
    pub key: Key,
    /// Record kind.
    pub kind: RecordKind,
    /// Value payload; empty for commit markers.
    pub value: Vec<u8>,
}

impl LogRecord {
    /// Creates a write record.
    #[must_use]
    pub fn write(txid: TransactionId, key: Key, value: Vec<u8>) -> Self {
        Self {
            txid,
            key,
            kind: RecordKind::Write,
            value,
        }
    }

    /// Creates a commit marker.
    #[must_use]
    pub fn commit(txid: TransactionId) -> Self {
        Self {
            txid,
            key: Key::COMMIT_SENTINEL,
            kind: RecordKind::Commit,
            value: Vec::new(),
        }
    }

    /// Returns true for write records.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.kind == RecordKind::Write
    }

    /// Returns true for commit markers.
    #[must_use]
    pub fn is_commit(&self) -> bool {
        self.kind == RecordKind::Commit
    }

    /// Returns the exact number of bytes `encode` produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.value.len()
    }

    /// Serializes the record.
    ///
    /// Layout, all integers big-endian:
    ///
    /// ```text
    /// | size (4) | txn_id (8) | key (8) | kind (4) | value (size - 24) |
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValueTooLarge`] if the value exceeds
    /// [`MAX_VALUE_SIZE`].
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        if self.value.len() > MAX_VALUE_SIZE {
            return Err(CoreError::value_too_large(self.value.len(), MAX_VALUE_SIZE));
        }

        // Safe: bounded by MAX_VALUE_SIZE above
        let size = self.encoded_len() as u32;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&size.to_be_bytes());
        buf.extend_from_slice(&self.txid.as_u64().to_be_bytes());
        buf.extend_from_slice(&self.key.as_u64().to_be_bytes());
        buf.extend_from_slice(&self.kind.as_u32().to_be_bytes());
        buf.extend_from_slice(&self.value);

        Ok(buf)
    }

    /// Deserializes the record at the front of `bytes`.
    ///
    /// Bytes past the declared size are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedRecord`] if the header is incomplete,
    /// the declared size is smaller than the header, fewer bytes than the
    /// declared size are available, or the kind is unknown.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::malformed_record(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }

        let size = peek_size(bytes)?;
        if size < HEADER_SIZE {
            return Err(CoreError::malformed_record(format!(
                "declared size {size} is smaller than the {HEADER_SIZE}-byte header"
            )));
        }
        if bytes.len() < size {
            return Err(CoreError::malformed_record(format!(
                "declared size {size} but only {} bytes available",
                bytes.len()
            )));
        }

        let txid = TransactionId::new(read_u64(&bytes[4..12]));
        let key = Key::new(read_u64(&bytes[12..20]));
        let raw_kind = read_u32(&bytes[20..24]);
        let kind = RecordKind::from_u32(raw_kind)
            .ok_or_else(|| CoreError::malformed_record(format!("unknown record kind {raw_kind}")))?;
        let value = bytes[HEADER_SIZE..size].to_vec();

        Ok(Self {
            txid,
            key,
            kind,
            value,
        })
    }
}

/// Reads the declared record size from a size prefix.
///
/// # Errors
///
/// Returns [`CoreError::MalformedRecord`] if fewer than
/// [`SIZE_PREFIX_LEN`] bytes are given.
pub fn peek_size(prefix: &[u8]) -> CoreResult<usize> {
    if prefix.len() < SIZE_PREFIX_LEN {
        return Err(CoreError::malformed_record(format!(
            "truncated size prefix: {} of {SIZE_PREFIX_LEN} bytes",
            prefix.len()
        )));
    }
    Ok(read_u32(&prefix[..SIZE_PREFIX_LEN]) as usize)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}
