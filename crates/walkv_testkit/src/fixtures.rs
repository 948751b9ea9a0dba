//! Test fixtures and manager helpers.
//!
//! Provides convenience functions for setting up managers over temporary
//! file logs or shared in-memory devices.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkv_core::{Config, CoreResult, TransactionManager};
use walkv_storage::{FileLog, InMemoryLog, InMemoryStore};

/// A log file in a temporary directory that is removed on drop.
#[derive(Debug)]
pub struct TempLogFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempLogFile {
    /// Creates a temporary directory and picks a log path inside it.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("wal.log"),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the log file, creating it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be opened.
    pub fn open(&self) -> FileLog {
        FileLog::open(&self.path).expect("Failed to open log file")
    }

    /// Recovers a manager over the log file and `store`.
    ///
    /// # Errors
    ///
    /// Returns the recovery error.
    pub fn recover(&self, store: &InMemoryStore) -> CoreResult<TransactionManager> {
        TransactionManager::init_and_recover(Box::new(self.open()), Box::new(store.clone()))
    }
}

impl Default for TempLogFile {
    fn default() -> Self {
        Self::new()
    }
}

/// A manager over shared in-memory devices.
///
/// Keeps handles to the log and store so tests can inspect them and drive
/// persistence while the manager runs.
#[derive(Debug)]
pub struct TestManager {
    /// The manager instance.
    pub tm: TransactionManager,
    /// Handle to the manager's log.
    pub log: InMemoryLog,
    /// Handle to the manager's store.
    pub store: InMemoryStore,
}

impl TestManager {
    /// Creates a manager over empty in-memory devices.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a manager with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if recovery over the empty devices fails.
    pub fn with_config(config: Config) -> Self {
        let log = InMemoryLog::new();
        let store = InMemoryStore::new();
        let tm = TransactionManager::init_and_recover_with_config(
            config,
            Box::new(log.clone()),
            Box::new(store.clone()),
        )
        .expect("Failed to open in-memory manager");
        Self { tm, log, store }
    }

    /// Persists every queued write and reports it to the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if truncation cannot advance.
    pub fn persist_all(&mut self) -> CoreResult<usize> {
        let done = self.store.persist_all();
        for write in &done {
            self.tm.write_persisted(write.key, write.tag, &write.value)?;
        }
        Ok(done.len())
    }
}

impl std::ops::Deref for TestManager {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.tm
    }
}

impl std::ops::DerefMut for TestManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tm
    }
}

/// Runs a test with a manager over a temporary file log.
///
/// # Example
///
/// ```rust
/// use walkv_core::{Key, TransactionId};
/// use walkv_testkit::with_temp_log;
///
/// with_temp_log(|tm| {
///     tm.start(TransactionId::new(1));
///     tm.write(TransactionId::new(1), Key::new(1), b"a".to_vec()).unwrap();
///     tm.commit(TransactionId::new(1)).unwrap();
/// });
/// ```
///
/// # Panics
///
/// Panics if the log cannot be created or recovered.
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&mut TransactionManager) -> R,
{
    let file = TempLogFile::new();
    let mut tm = file
        .recover(&InMemoryStore::new())
        .expect("Failed to recover manager");
    f(&mut tm)
}
