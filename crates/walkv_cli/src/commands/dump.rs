//! Dump command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use walkv_core::wal::LogScanner;
use walkv_storage::LogDevice;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset (tag) of the record.
    pub offset: u64,
    /// Record kind.
    pub kind: &'static str,
    /// Transaction id.
    pub txid: u64,
    /// Target key, absent for commit markers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
    /// Value size in bytes.
    pub value_size: usize,
}

/// Records read before the scan stopped, and why it stopped early.
#[derive(Debug, Serialize)]
pub struct DumpOutput {
    /// Truncation offset of the log.
    pub truncation_offset: u64,
    /// End offset of the log.
    pub end_offset: u64,
    /// Records in log order.
    pub records: Vec<RecordInfo>,
    /// Decode error that ended the scan, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: Option<u64>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    let output = read_records(&log, start_offset, limit);

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => {
            print_text_output(&output);
        }
    }

    match output.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn read_records(log: &dyn LogDevice, start_offset: Option<u64>, limit: Option<usize>) -> DumpOutput {
    let start = start_offset.unwrap_or_else(|| log.truncation_offset());
    let max_records = limit.unwrap_or(usize::MAX);

    let mut output = DumpOutput {
        truncation_offset: log.truncation_offset(),
        end_offset: log.end_offset(),
        records: Vec::new(),
        error: None,
    };

    for item in LogScanner::from_offset(log, start).take(max_records) {
        match item {
            Ok((tag, record)) => output.records.push(RecordInfo {
                offset: tag.offset(),
                kind: record.kind.name(),
                txid: record.txid.as_u64(),
                key: record.is_write().then_some(record.key.as_u64()),
                value_size: record.value.len(),
            }),
            Err(err) => output.error = Some(err.to_string()),
        }
    }

    output
}

fn print_text_output(output: &DumpOutput) {
    println!(
        "Log Records ({} shown, offsets {}..{})",
        output.records.len(),
        output.truncation_offset,
        output.end_offset
    );
    println!("================");
    println!();

    for record in &output.records {
        print!("[{:08}] {:6} txid={}", record.offset, record.kind, record.txid);
        if let Some(key) = record.key {
            print!(" key={key} value={} bytes", record.value_size);
        }
        println!();
    }

    if let Some(ref err) = output.error {
        println!();
        println!("✗ scan stopped: {err}");
    }
}
