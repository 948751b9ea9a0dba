//! CLI command implementations.

pub mod dump;
pub mod verify;

use std::path::Path;
use walkv_storage::FileLog;

/// Opens an existing log file. Unlike `FileLog::open`, a missing file is
/// an error rather than created.
fn open_existing(path: &Path) -> Result<FileLog, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("log file not found: {}", path.display()).into());
    }
    Ok(FileLog::open(path)?)
}
