//! Verify command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use walkv_core::RecoveryScan;
use walkv_storage::LogDevice;

/// Verification result.
#[derive(Debug, Default, Serialize)]
pub struct VerifyResult {
    /// Offset the scan started at.
    pub start_offset: u64,
    /// Offset the scan stopped at.
    pub end_offset: u64,
    /// Number of records decoded.
    pub records_checked: u64,
    /// Transactions with a COMMIT record.
    pub committed_transactions: u64,
    /// Transactions with writes but no COMMIT record.
    pub uncommitted_transactions: u64,
    /// Writes recovery would replay.
    pub replayable_writes: u64,
    /// Writes recovery would ignore.
    pub ignored_writes: u64,
    /// Highest transaction id in the log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_txid: Option<u64>,
    /// Why recovery would fail, if it would.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    let result = verify_log(&log);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => {
            println!("Verifying log at {}", path.display());
            println!();
            print_result(&result);
        }
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}

fn verify_log(log: &dyn LogDevice) -> VerifyResult {
    match RecoveryScan::read(log) {
        Ok(scan) => {
            let report = scan.report();
            VerifyResult {
                start_offset: report.start_offset,
                end_offset: report.end_offset,
                records_checked: report.records_scanned,
                committed_transactions: report.committed_transactions,
                uncommitted_transactions: report.uncommitted_transactions,
                replayable_writes: report.writes_replayed,
                ignored_writes: report.writes_ignored,
                max_txid: report.max_txid.map(|txid| txid.as_u64()),
                error: None,
            }
        }
        Err(err) => VerifyResult {
            start_offset: log.truncation_offset(),
            end_offset: log.end_offset(),
            error: Some(err.to_string()),
            ..VerifyResult::default()
        },
    }
}

fn print_result(result: &VerifyResult) {
    println!("  Offsets:                  {}..{}", result.start_offset, result.end_offset);
    println!("  Records checked:          {}", result.records_checked);
    println!("  Committed transactions:   {}", result.committed_transactions);
    println!("  Uncommitted transactions: {}", result.uncommitted_transactions);
    println!("  Replayable writes:        {}", result.replayable_writes);
    println!("  Ignored writes:           {}", result.ignored_writes);
    if let Some(txid) = result.max_txid {
        println!("  Highest transaction id:   {txid}");
    }
    println!();
    match result.error {
        None => println!("✓ Log verification passed"),
        Some(ref err) => {
            println!("  Error: {err}");
            println!("✗ Log verification failed");
        }
    }
}
