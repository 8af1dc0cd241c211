use crate::orchestrator::{export_rows, ExportReport};
use anyhow::Result;
use nightwatch::model::Record;
use nightwatch::state::ViewState;
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn apply_report(state: &mut ViewState, report: ExportReport) {
    if let Some(path) = report.path {
        state.last_exported_path = Some(path);
    }
    state.info = report.message;
}

fn export_into(state: &mut ViewState, rows: Option<Vec<Record>>, dir: &Path, stem: &str, missing: &str) {
    match rows {
        Some(rows) => {
            let report = export_rows(&rows, dir, stem);
            apply_report(state, report);
        }
        None => state.info = missing.to_string(),
    }
}

/// Export the rows of the last query result.
pub fn export_query_rows(state: &mut ViewState, dir: &Path) {
    let rows = state.last_query.as_ref().map(|q| q.rows.clone());
    export_into(state, rows, dir, "query-results", "No query result to export yet.");
}

/// Export the findings of the current scan.
pub fn export_scan_findings(state: &mut ViewState, dir: &Path) {
    let rows = state
        .scan
        .as_ref()
        .and_then(|s| s.result.as_ref())
        .map(|c| c.findings.clone());
    export_into(state, rows, dir, "sentinel-findings", "No completed scan to export yet.");
}

/// Export the findings of the scan loaded from history.
pub fn export_history_findings(state: &mut ViewState, dir: &Path) {
    let loaded = state.history_detail.as_ref();
    let stem = loaded
        .map(|(id, _)| format!("sentinel-{id}"))
        .unwrap_or_default();
    let rows = loaded.map(|(_, c)| c.findings.clone());
    export_into(state, rows, dir, &stem, "Load a scan first (enter).");
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each clipboard instance is kept alive long enough for clipboard managers to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard without blocking the UI thread.
fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

/// Copy the last exported path and report it on the status line.
pub fn copy_last_export(state: &mut ViewState) {
    let Some(path) = state.last_exported_path.as_ref() else {
        state.info = "No exported file path to copy. Export a file first.".into();
        return;
    };
    let path = path.to_string_lossy().to_string();
    state.info = match copy_to_clipboard(&path) {
        Ok(()) => {
            let shown = if path.chars().count() > 60 {
                format!("{}...", path.chars().take(57).collect::<String>())
            } else {
                path
            };
            format!("Copied to clipboard: {shown}")
        }
        Err(e) => format!("Clipboard copy failed: {e:#}"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightwatch::model::{Domain, QueryResult};
    use serde_json::json;

    #[test]
    fn query_export_records_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ViewState::new(Domain::General);
        export_query_rows(&mut state, dir.path());
        assert_eq!(state.info, "No query result to export yet.");

        state.last_query = Some(QueryResult {
            rows: serde_json::from_value(json!([{ "user_id": 7 }])).unwrap(),
            ..Default::default()
        });
        export_query_rows(&mut state, dir.path());
        let path = state.last_exported_path.clone().unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(state.info.starts_with("Exported CSV:"));
    }

    #[test]
    fn empty_findings_keep_previous_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ViewState::new(Domain::General);
        state.last_exported_path = Some(dir.path().join("earlier.csv"));
        state.history_detail = Some(("abc".into(), Default::default()));
        export_history_findings(&mut state, dir.path());
        assert_eq!(state.info, "Nothing to export");
        assert_eq!(state.last_exported_path, Some(dir.path().join("earlier.csv")));
    }
}
