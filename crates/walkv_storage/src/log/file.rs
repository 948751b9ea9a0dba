//! File-based log device for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::log::LogDevice;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every log file.
const FILE_LOG_MAGIC: [u8; 4] = *b"WKVL";

/// Current log file format version.
const FILE_LOG_VERSION: u32 = 1;

/// Size of the file header: magic (4) + version (4) + truncation offset (8)
/// + synced end offset (8).
pub const FILE_LOG_HEADER_SIZE: u64 = 24;

/// Position of the truncation offset inside the header.
const TRUNCATION_FIELD_POS: u64 = 8;

/// A single-file log device.
///
/// # File Layout
///
/// ```text
/// | magic "WKVL" (4) | version (4) | truncation (8) | synced end (8) | log bytes ... |
/// ```
///
/// Header integers are big-endian. Logical log offsets start right after
/// the header, so offset 0 is file position 24.
///
/// # Durability
///
/// - `sync()` makes the appended bytes durable, then records the end offset
///   in the header and syncs again
/// - `set_truncation_offset()` does the same and also records the new
///   truncation offset
///
/// On open, only bytes up to the recorded end offset count as log. Anything
/// after it was appended but never synced (a torn tail, or the leftovers of
/// a failed write) and is cut off.
///
/// Bytes below the truncation offset become unreadable but are not
/// physically reclaimed.
///
/// # Locking
///
/// The file is locked exclusively for as long as the `FileLog` lives; a
/// second open from another process fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use walkv_storage::{FileLog, LogDevice};
/// use std::path::Path;
///
/// let mut log = FileLog::open(Path::new("wal.log")).unwrap();
/// let offset = log.append(b"persistent data").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
    end: u64,
    truncation: u64,
}

impl FileLog {
    /// Opens or creates a log file at the given path.
    ///
    /// A new file gets a fresh header with truncation offset 0. An existing
    /// file is cut back to the end offset recorded by its last sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or carries an invalid header.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(StorageError::Locked);
        }

        let len = file.metadata()?.len();
        let (truncation, end) = if len == 0 {
            write_header(&mut file, 0, 0)?;
            (0, 0)
        } else {
            read_header(&mut file, len)?
        };

        if truncation > end {
            return Err(StorageError::Corrupted(format!(
                "truncation offset {truncation} beyond end of log {end}"
            )));
        }
        let stored = len.saturating_sub(FILE_LOG_HEADER_SIZE);
        if stored < end {
            return Err(StorageError::Corrupted(format!(
                "log file holds {stored} bytes but {end} were synced"
            )));
        }
        if stored > end {
            file.set_len(FILE_LOG_HEADER_SIZE + end)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            end,
            truncation,
        })
    }

    /// Opens or creates a log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_header(file: &mut File, truncation: u64, end: u64) -> StorageResult<()> {
    let mut header = Vec::with_capacity(FILE_LOG_HEADER_SIZE as usize);
    header.extend_from_slice(&FILE_LOG_MAGIC);
    header.extend_from_slice(&FILE_LOG_VERSION.to_be_bytes());
    header.extend_from_slice(&truncation.to_be_bytes());
    header.extend_from_slice(&end.to_be_bytes());

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    file.sync_all()?;
    Ok(())
}

/// Returns the truncation offset and synced end offset.
fn read_header(file: &mut File, len: u64) -> StorageResult<(u64, u64)> {
    if len < FILE_LOG_HEADER_SIZE {
        return Err(StorageError::Corrupted(format!(
            "log file too short for header: {len} bytes"
        )));
    }

    let mut header = [0u8; FILE_LOG_HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    if header[0..4] != FILE_LOG_MAGIC {
        return Err(StorageError::Corrupted("invalid log file magic".into()));
    }

    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version > FILE_LOG_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported log file version {version}"
        )));
    }

    Ok((read_u64(&header[8..16]), read_u64(&header[16..24])))
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

impl FileLog {
    /// Syncs the log bytes, then records `truncation` and the current end
    /// offset in the header and syncs it.
    fn sync_with_truncation(&self, truncation: u64) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.set_len(FILE_LOG_HEADER_SIZE + self.end)?;
        file.flush()?;
        file.sync_all()?;

        let mut fields = [0u8; 16];
        fields[..8].copy_from_slice(&truncation.to_be_bytes());
        fields[8..].copy_from_slice(&self.end.to_be_bytes());
        file.seek(SeekFrom::Start(TRUNCATION_FIELD_POS))?;
        file.write_all(&fields)?;
        file.sync_all()?;
        Ok(())
    }
}

impl LogDevice for FileLog {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.end;
        if data.is_empty() {
            return Ok(offset);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(FILE_LOG_HEADER_SIZE + offset))?;
        file.write_all(data)?;
        self.end += data.len() as u64;

        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        if offset < self.truncation {
            return Err(StorageError::ReadBelowTruncation {
                offset,
                truncation: self.truncation,
            });
        }
        if offset.saturating_add(len as u64) > self.end {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                end: self.end,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(FILE_LOG_HEADER_SIZE + offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn truncation_offset(&self) -> u64 {
        self.truncation
    }

    fn set_truncation_offset(&mut self, offset: u64) -> StorageResult<()> {
        if offset < self.truncation || offset > self.end {
            return Err(StorageError::InvalidTruncation {
                requested: offset,
                current: self.truncation,
                end: self.end,
            });
        }
        if offset == self.truncation {
            return Ok(());
        }

        self.sync_with_truncation(offset)?;
        self.truncation = offset;

        Ok(())
    }

    fn end_offset(&self) -> u64 {
        self.end
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.sync_with_truncation(self.truncation)
    }
}
