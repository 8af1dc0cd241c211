//! Plain-text rendering for the one-shot CLI modes.
//!
//! Builds human-readable lines from query results, scan progress and history.

use crate::export::{cell_text, field_union};
use crate::model::{ChatMessage, HealthStatus, QueryResult, ScanCompletion, ScanEvent, ScanHistoryEntry};
use crate::viz::{format_number, RenderSpec, MAX_BARS};

/// Width of a full (100%) text bar.
const BAR_CELLS: usize = 40;
/// Rows shown in a text table before eliding the rest.
const MAX_TABLE_ROWS: usize = 20;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

pub fn build_query_summary(
    reply: &ChatMessage,
    result: &QueryResult,
    render: Option<&RenderSpec>,
) -> TextSummary {
    let mut lines = vec![reply.text.clone()];

    if result.clarification_needed {
        return TextSummary { lines };
    }
    if let Some(sql) = reply.sql() {
        lines.push(format!("SQL: {sql}"));
    }
    for insight in &result.insights {
        lines.push(format!("* {insight}"));
    }

    match render {
        Some(RenderSpec::Metric { label, value }) => {
            lines.push(format!("{label}: {value}"));
        }
        Some(RenderSpec::Bars(bars)) => {
            let label_width = bars.iter().map(|b| b.label.chars().count()).max().unwrap_or(0);
            for bar in bars {
                let cells = usize::from(bar.width_pct) * BAR_CELLS / 100;
                lines.push(format!(
                    "{:<label_width$} | {:<BAR_CELLS$} {}",
                    bar.label,
                    "#".repeat(cells),
                    format_number(bar.value)
                ));
            }
            if result.rows.len() > MAX_BARS {
                lines.push(format!("({} more row(s) not charted)", result.rows.len() - MAX_BARS));
            }
        }
        None => {}
    }

    lines.extend(table_lines(&result.rows));
    TextSummary { lines }
}

/// Tab-separated table: header row then up to `MAX_TABLE_ROWS` rows.
pub fn table_lines(rows: &[crate::model::Record]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["(no rows)".to_string()];
    }
    let headers = field_union(rows);
    let mut lines = vec![headers.join("\t")];
    for row in rows.iter().take(MAX_TABLE_ROWS) {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(cell_text).unwrap_or_default())
            .collect();
        lines.push(cells.join("\t"));
    }
    if rows.len() > MAX_TABLE_ROWS {
        lines.push(format!("... {} more row(s)", rows.len() - MAX_TABLE_ROWS));
    }
    lines
}

/// One progress line for a scan event, e.g. `[mission] failed_logins completed`.
pub fn scan_event_line(event: &ScanEvent) -> String {
    let field = |k: &str| event.payload.get(k).map(cell_text).filter(|s| !s.is_empty());
    let subject = field("mission_id")
        .or_else(|| field("title"))
        .or_else(|| field("message"));
    let status = field("status");
    match (subject, status) {
        (Some(s), Some(st)) => format!("[{}] {s} {st}", event.kind.as_str()),
        (Some(s), None) => format!("[{}] {s}", event.kind.as_str()),
        (None, Some(st)) => format!("[{}] {st}", event.kind.as_str()),
        (None, None) => format!("[{}] {}", event.kind.as_str(), event.payload),
    }
}

pub fn build_scan_summary(completion: &ScanCompletion) -> TextSummary {
    let mut lines = Vec::new();
    if let Some(id) = completion.scan_id.as_deref() {
        lines.push(format!("Scan: {id}"));
    }
    lines.push(format!("Risk score: {}", format_number(completion.risk_score)));
    if !completion.narrative.trim().is_empty() {
        lines.push(completion.narrative.trim().to_string());
    }
    lines.push(format!("Findings: {}", completion.findings.len()));
    if !completion.findings.is_empty() {
        lines.extend(table_lines(&completion.findings));
    }
    TextSummary { lines }
}

pub fn health_line(health: &HealthStatus) -> String {
    match (health.online, health.env.as_deref()) {
        (true, Some(env)) => format!("API Online ({env})"),
        (true, None) => "API Online".to_string(),
        (false, _) => "API Offline".to_string(),
    }
}

pub fn history_lines(history: &[ScanHistoryEntry]) -> Vec<String> {
    if history.is_empty() {
        return vec!["No past scans.".to_string()];
    }
    history
        .iter()
        .map(|h| {
            format!(
                "{}  {:<11} {:<10} risk {:>5}  {}",
                h.scan_id,
                h.domain,
                h.status,
                format_number(h.risk_score),
                h.created_at
            )
        })
        .collect()
}
