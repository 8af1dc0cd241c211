//! Delimited-text export of result rows.
//!
//! Rows may carry different field sets; the header is the first-seen union of all
//! field names. Header names are written bare and every value cell is quoted.

use crate::model::Record;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Numbered variants tried before giving up on a free export file name.
const MAX_NAME_ATTEMPTS: usize = 100;

/// Union of field names across `rows`, in first-seen order.
pub fn field_union(rows: &[Record]) -> Vec<&str> {
    let mut fields: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !fields.contains(&key.as_str()) {
                fields.push(key.as_str());
            }
        }
    }
    fields
}

/// Text of one cell. `null` renders empty, strings raw, anything else as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialise `rows` as comma-separated text with quoted value cells with `\n` line breaks and no
/// trailing terminator. Empty input yields an empty string.
pub fn to_delimited_text(rows: &[Record]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    match write_records(rows) {
        Ok(text) => text,
        Err(e) => {
            // Writing into memory does not fail in practice.
            tracing::error!(error = %e, "delimited-text serialisation failed");
            String::new()
        }
    }
}

fn write_records(rows: &[Record]) -> Result<String, csv::Error> {
    let headers = field_union(rows);

    // Header names only get quotes when they would not parse back otherwise.
    let mut header = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    header.write_record(&headers)?;
    let buf = header.into_inner().map_err(|e| e.into_error())?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(buf);
    for row in rows {
        writer.write_record(
            headers
                .iter()
                .map(|h| row.get(*h).map(cell_text).unwrap_or_default()),
        )?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Directory exports land in when none is configured: the user's download
/// directory, else the current directory.
pub fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn stamped(stem: &str) -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let stamp = now
        .format(time::macros::format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "now".into());
    format!("{stem}-{stamp}")
}

/// File name for an export made now, e.g. `query-results-20250101-120000.csv`.
pub fn export_file_name(stem: &str) -> String {
    format!("{}.csv", stamped(stem))
}

/// Write `rows` to `path`. Returns false (and writes nothing) for an empty row set.
pub fn write_delimited(rows: &[Record], path: &Path) -> Result<bool> {
    let text = to_delimited_text(rows);
    if text.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export directory {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "exported rows");
    Ok(true)
}

/// Write `rows` to a new timestamped file named after `stem` inside `dir`.
///
/// Existing files are never replaced: a second export within the same second gets
/// a numbered name (`stem-20250101-120000-2.csv`). Returns `None` when there is
/// nothing to export.
pub fn write_delimited_file(rows: &[Record], dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let text = to_delimited_text(rows);
    if text.is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create export directory {}", dir.display()))?;

    let base = stamped(stem);
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let name = match attempt {
            1 => format!("{base}.csv"),
            n => format!("{base}-{n}.csv"),
        };
        let path = dir.join(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("create {}", path.display())),
        };
        file.write_all(text.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "exported rows");
        return Ok(Some(path));
    }
    anyhow::bail!("no free file name for `{stem}` export in {}", dir.display())
}
