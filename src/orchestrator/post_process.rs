//! Post-result processing: exports and history refresh decisions shared by the TUI
//! and the one-shot CLI modes.

use anyhow::Result;
use nightwatch::export;
use nightwatch::model::Record;
use nightwatch::scan::{ScanUpdate, ScanUpdateKind};
use std::path::{Path, PathBuf};

/// Outcome of one export, ready for a status line.
pub(crate) struct ExportReport {
    pub path: Option<PathBuf>,
    pub message: String,
}

/// Export `rows` as `<stem>-<timestamp>.csv` inside `dir`.
pub(crate) fn export_rows(rows: &[Record], dir: &Path, stem: &str) -> ExportReport {
    match export::write_delimited_file(rows, dir, stem) {
        Ok(Some(path)) => ExportReport {
            message: format!("Exported CSV: {} (press 'y' to copy path)", path.display()),
            path: Some(path),
        },
        Ok(None) => ExportReport {
            path: None,
            message: "Nothing to export".into(),
        },
        Err(e) => ExportReport {
            path: None,
            message: format!("CSV export failed: {e:#}"),
        },
    }
}

/// Export `rows` to an explicit path (`--export-csv`). Empty results write nothing.
pub(crate) fn export_rows_to(rows: &[Record], path: &Path) -> Result<Option<PathBuf>> {
    Ok(export::write_delimited(rows, path)?.then(|| path.to_path_buf()))
}

/// A finished scan lands in the backend history, so the list is stale.
pub(crate) fn wants_history_refresh(update: &ScanUpdate) -> bool {
    matches!(update.kind, ScanUpdateKind::Completed(ref c) if c.scan_id.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightwatch::model::ScanCompletion;
    use serde_json::json;

    #[test]
    fn export_report_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<Record> = serde_json::from_value(json!([{ "count": 1 }])).unwrap();
        let report = export_rows(&rows, dir.path(), "query-results");
        let path = report.path.unwrap();
        assert!(path.exists());
        assert!(report.message.starts_with("Exported CSV:"));

        let empty = export_rows(&[], dir.path(), "query-results");
        assert!(empty.path.is_none());
        assert_eq!(empty.message, "Nothing to export");
    }

    #[test]
    fn only_persisted_scans_refresh_history() {
        let done = |scan_id: Option<&str>| ScanUpdate {
            session: 1,
            kind: ScanUpdateKind::Completed(ScanCompletion {
                scan_id: scan_id.map(str::to_string),
                ..Default::default()
            }),
        };
        assert!(wants_history_refresh(&done(Some("abc"))));
        assert!(!wants_history_refresh(&done(None)));
        assert!(!wants_history_refresh(&ScanUpdate {
            session: 1,
            kind: ScanUpdateKind::Connected,
        }));
    }
}
