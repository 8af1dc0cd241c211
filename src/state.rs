//! Aggregate UI state. Everything the front ends show is derived from one
//! [`ViewState`], and each kind of event has exactly one method that mutates it.

use crate::error::ClientError;
use crate::model::{
    ChatMessage, Domain, HealthStatus, QueryResult, ScanCompletion, ScanEvent, ScanHistoryEntry,
    SessionStatus,
};
use crate::query::{assistant_reply, QueryOutcome};
use crate::scan::{ScanUpdate, ScanUpdateKind, SessionId};
use crate::viz::{self, RenderSpec, ResolveOptions};
use std::path::PathBuf;

pub const GREETING: &str = "Ask a question about users, logins, or transactions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Query,
    Sentinel,
    History,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Query, Tab::Sentinel, Tab::History, Tab::Help];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Query => "Query",
            Tab::Sentinel => "Sentinel",
            Tab::History => "History",
            Tab::Help => "Help",
        }
    }

    fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

/// Client-side view of one scan session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSessionState {
    pub id: SessionId,
    pub domain: Domain,
    pub events: Vec<ScanEvent>,
    pub status: SessionStatus,
    pub result: Option<ScanCompletion>,
    pub failure: Option<String>,
}

impl ScanSessionState {
    pub fn new(id: SessionId, domain: Domain) -> Self {
        Self {
            id,
            domain,
            events: Vec::new(),
            status: SessionStatus::Pending,
            result: None,
            failure: None,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub tab: Tab,
    pub domain: Domain,
    /// `None` until the first health check answers.
    pub health: Option<HealthStatus>,

    messages: Vec<ChatMessage>,
    pub input: String,
    pub query_busy: bool,
    pending_query: Option<String>,
    pub last_query: Option<QueryResult>,
    pub render: Option<RenderSpec>,
    pub resolve_options: ResolveOptions,

    pub scan: Option<ScanSessionState>,

    pub history: Vec<ScanHistoryEntry>,
    pub history_selected: usize,
    pub history_detail: Option<(String, ScanCompletion)>,

    /// One-line status shown in the footer.
    pub info: String,
    pub last_exported_path: Option<PathBuf>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(Domain::default())
    }
}

impl ViewState {
    pub fn new(domain: Domain) -> Self {
        Self {
            tab: Tab::default(),
            domain,
            health: None,
            messages: vec![ChatMessage::assistant(GREETING)],
            input: String::new(),
            query_busy: false,
            pending_query: None,
            last_query: None,
            render: None,
            resolve_options: ResolveOptions::default(),
            scan: None,
            history: Vec::new(),
            history_selected: 0,
            history_detail: None,
            info: String::new(),
            last_exported_path: None,
        }
    }

    /// Chat log in arrival order. Only [`submit_query`](Self::submit_query) and
    /// [`complete_query`](Self::complete_query) append to it.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn cycle_domain(&mut self) {
        self.domain = self.domain.next();
        self.info = format!("Domain: {}", self.domain);
    }

    pub fn health_label(&self) -> &'static str {
        match &self.health {
            None => "Checking API",
            Some(h) if h.online => "API Online",
            Some(_) => "API Offline",
        }
    }

    // --- queries ---

    /// Start a query for `text`. Returns the trimmed text to send, or `None` when
    /// the input is blank or another query is still in flight.
    pub fn submit_query(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.query_busy {
            tracing::debug!("query already in flight; ignoring submit");
            return None;
        }
        self.messages.push(ChatMessage::user(text));
        self.query_busy = true;
        self.pending_query = Some(text.to_string());
        self.info = "Running query...".into();
        Some(text.to_string())
    }

    /// Apply the response to the query started by the last successful `submit_query`.
    pub fn complete_query(
        &mut self,
        domain: Domain,
        result: Result<QueryResult, ClientError>,
    ) -> QueryOutcome {
        self.query_busy = false;
        let submitted = self.pending_query.take();

        match result {
            Ok(result) => {
                self.messages.push(assistant_reply(&result, domain));
                if submitted.as_deref() == Some(self.input.trim()) {
                    self.input.clear();
                }
                let outcome = if result.clarification_needed {
                    self.render = None;
                    self.info = "Clarification needed".into();
                    QueryOutcome::Clarification
                } else {
                    self.render = viz::resolve_with(
                        &result.rows,
                        result.visualization.as_ref(),
                        &self.resolve_options,
                    );
                    self.info = format!("{} row(s)", result.rows.len());
                    QueryOutcome::Answered {
                        rows: result.rows.len(),
                    }
                };
                self.last_query = Some(result);
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                self.info = format!("Query failed ({}): {e}", e.category());
                QueryOutcome::Failed(e)
            }
        }
    }

    // --- scans ---

    /// Fold one session update in. Returns false when the update was stale and
    /// discarded.
    pub fn apply_scan_update(&mut self, update: ScanUpdate) -> bool {
        if let ScanUpdateKind::Started { domain } = update.kind {
            if self.scan.as_ref().is_some_and(|s| s.id > update.session) {
                return false;
            }
            self.scan = Some(ScanSessionState::new(update.session, domain));
            self.info = format!("Scan #{} started ({domain})", update.session);
            return true;
        }

        let Some(scan) = self.scan.as_mut() else {
            tracing::debug!(session = update.session, "scan update without a session");
            return false;
        };
        if scan.id != update.session || scan.status.is_terminal() {
            tracing::debug!(
                session = update.session,
                current = scan.id,
                "discarding stale scan update"
            );
            return false;
        }

        match update.kind {
            ScanUpdateKind::Started { .. } => return false,
            ScanUpdateKind::Connected => {
                scan.status = SessionStatus::Streaming;
                self.info = format!("Scan #{} streaming", scan.id);
            }
            ScanUpdateKind::Event(event) => {
                scan.status = SessionStatus::Streaming;
                scan.events.push(event);
            }
            ScanUpdateKind::Completed(result) => {
                scan.status = SessionStatus::Completed;
                self.info = format!(
                    "Scan complete: risk score {}",
                    viz::format_number(result.risk_score)
                );
                scan.result = Some(result);
            }
            ScanUpdateKind::Failed(message) => {
                scan.status = SessionStatus::Failed;
                self.info = format!("Scan failed: {message}");
                scan.failure = Some(message);
            }
        }
        true
    }

    pub fn scan_running(&self) -> bool {
        self.scan.as_ref().is_some_and(ScanSessionState::is_running)
    }

    // --- health / history ---

    pub fn apply_health(&mut self, health: Result<HealthStatus, ClientError>) {
        self.health = Some(match health {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                HealthStatus::offline()
            }
        });
    }

    pub fn apply_history(&mut self, history: Result<Vec<ScanHistoryEntry>, ClientError>) {
        match history {
            Ok(entries) => {
                self.info = format!("{} past scan(s)", entries.len());
                self.history = entries;
                self.history_selected = self
                    .history_selected
                    .min(self.history.len().saturating_sub(1));
            }
            Err(e) => self.info = format!("History unavailable: {e}"),
        }
    }

    pub fn apply_history_detail(&mut self, scan_id: String, detail: Result<ScanCompletion, ClientError>) {
        match detail {
            Ok(completion) => {
                self.info = format!("Loaded scan {scan_id}");
                self.history_detail = Some((scan_id, completion));
            }
            Err(e) => self.info = format!("Scan {scan_id} unavailable: {e}"),
        }
    }

    pub fn selected_history(&self) -> Option<&ScanHistoryEntry> {
        self.history.get(self.history_selected)
    }

    pub fn select_next_history(&mut self) {
        if self.history_selected + 1 < self.history.len() {
            self.history_selected += 1;
        }
    }

    pub fn select_prev_history(&mut self) {
        self.history_selected = self.history_selected.saturating_sub(1);
    }
}
