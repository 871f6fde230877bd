//! On-disk layout for context shards.
//!
//! Each context fingerprint owns two files under the storage root:
//!
//! ```text
//! <fingerprint>.context.json   pretty-printed context fields
//! <fingerprint>.data.jsonl     one row object per line, append-only
//! ```
//!
//! Data shards are append-only newline-delimited JSON. A crash between record
//! writes leaves prior records intact; readers skip a trailing partial line
//! (no newline) and skip corrupt lines with a diagnostic instead of failing
//! the whole read.

use crate::context::Context;
use crate::error::{Error, Result};
use log::{debug, warn};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One flat record produced by a single log call, as stored on disk.
/// Context fields are not repeated here — readers merge them back in.
pub type Row = serde_json::Map<String, Value>;

const CONTEXT_SUFFIX: &str = ".context.json";
const DATA_SUFFIX: &str = ".data.jsonl";

pub(crate) fn context_path(root: &Path, fingerprint: &str) -> PathBuf {
    root.join(format!("{fingerprint}{CONTEXT_SUFFIX}"))
}

pub(crate) fn data_path(root: &Path, fingerprint: &str) -> PathBuf {
    root.join(format!("{fingerprint}{DATA_SUFFIX}"))
}

/// Durably write the context record, via a `.tmp` + rename so a crash
/// mid-write never leaves a torn context file.
pub(crate) fn write_context(root: &Path, fingerprint: &str, context: &Context) -> Result<()> {
    let path = context_path(root, fingerprint);
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(context)?;
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Load a context record. Returns `Ok(None)` if the file doesn't exist.
///
/// Unlike data rows, a corrupt context is a hard error — without it the
/// shard's rows cannot be attributed to any run.
pub(crate) fn read_context(root: &Path, fingerprint: &str) -> Result<Option<Context>> {
    let path = context_path(root, fingerprint);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&contents) {
        Ok(context) => Ok(Some(context)),
        Err(_) => Err(Error::CorruptContext { path }),
    }
}

/// Append rows to the data shard, one discrete JSON line per row, then sync.
///
/// Rows are written in order; a crash between lines leaves every fully
/// written line readable.
pub(crate) fn append_rows(root: &Path, fingerprint: &str, rows: &[Row]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_path(root, fingerprint))?;
    for row in rows {
        let json = serde_json::to_string(row)?;
        writeln!(file, "{json}")?;
    }
    file.sync_data()?;
    Ok(())
}

/// Read all complete rows from the data shard.
///
/// Returns an empty vec if the shard doesn't exist. A final line without a
/// trailing newline is a partial write from a crash and is skipped; a line
/// that fails to parse is skipped with a diagnostic.
pub(crate) fn read_rows(root: &Path, fingerprint: &str) -> Result<Vec<Row>> {
    let path = data_path(root, fingerprint);
    // Raw bytes, not a string read: a crash can truncate the tail inside a
    // multi-byte UTF-8 character, and that must only cost the torn record.
    let contents = match fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let complete = match contents.iter().rposition(|&b| b == b'\n') {
        Some(last_newline) => {
            if last_newline + 1 < contents.len() {
                debug!(
                    "runlog: skipping partial trailing record in {}",
                    path.display()
                );
            }
            &contents[..last_newline]
        }
        None => {
            if !contents.is_empty() {
                debug!(
                    "runlog: skipping partial trailing record in {}",
                    path.display()
                );
            }
            &[][..]
        }
    };

    let mut rows = Vec::new();
    for line in complete.split(|&b| b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Row>(line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("runlog: skipping corrupt record in {}: {e}", path.display()),
        }
    }
    Ok(rows)
}

/// List every context fingerprint that has a context record under the root.
pub(crate) fn scan_fingerprints(root: &Path) -> Result<Vec<String>> {
    let mut fingerprints = Vec::new();
    let entries = match fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(fingerprints),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(CONTEXT_SUFFIX) {
            fingerprints.push(stem.to_string());
        }
    }
    fingerprints.sort();
    Ok(fingerprints)
}
