use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One result row. Field order follows the wire order (`preserve_order`).
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub domain: Domain,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default, with = "humantime_serde")]
    pub scan_timeout: Option<Duration>,
    /// Use the streamed scan endpoint; `false` falls back to the single-shot one.
    pub stream: bool,
    pub user_agent: String,
}

/// Analytical context for both queries and scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    General,
    Security,
    Compliance,
    Risk,
    Operations,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::General,
        Domain::Security,
        Domain::Compliance,
        Domain::Risk,
        Domain::Operations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::General => "general",
            Domain::Security => "security",
            Domain::Compliance => "compliance",
            Domain::Risk => "risk",
            Domain::Operations => "operations",
        }
    }

    /// Next domain in selector order, wrapping around.
    pub fn next(self) -> Domain {
        let idx = Domain::ALL.iter().position(|d| *d == self).unwrap_or(0);
        Domain::ALL[(idx + 1) % Domain::ALL.len()]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown domain {s:?} (expected one of: general, security, compliance, risk, operations)"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageMeta {
    Query { sql: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MessageMeta>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            meta: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            meta: None,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match &self.meta {
            Some(MessageMeta::Query { sql }) => sql.as_deref(),
            None => None,
        }
    }
}

/// Backend hint for charting a result. Unknown `type` values (e.g. `table`) map to
/// `Unsupported`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisualizationDescriptor {
    Metric {
        #[serde(default, rename = "value")]
        value_label: String,
    },
    Bar {
        #[serde(default, rename = "x")]
        x_field: Option<String>,
        #[serde(default, rename = "y")]
        y_field: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

/// Result of one query submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Record>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub insights: Vec<String>,
    #[serde(default, deserialize_with = "lenient_descriptor")]
    pub visualization: Option<VisualizationDescriptor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clarification_needed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clarification_questions: Vec<String>,
}

/// Explicit `null` decodes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A descriptor that fails to decode is treated as absent instead of failing the
/// whole query result.
fn lenient_descriptor<'de, D>(deserializer: D) -> Result<Option<VisualizationDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match serde_json::from_value(v) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable visualization descriptor");
            None
        }
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventKind {
    Status,
    Mission,
    DeepDive,
    Correlation,
}

impl ScanEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanEventKind::Status => "status",
            ScanEventKind::Mission => "mission",
            ScanEventKind::DeepDive => "deep_dive",
            ScanEventKind::Correlation => "correlation",
        }
    }

    /// Map a server-sent event name to a progress kind.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(ScanEventKind::Status),
            "mission" => Some(ScanEventKind::Mission),
            "deep_dive" => Some(ScanEventKind::DeepDive),
            "correlation" => Some(ScanEventKind::Correlation),
            _ => None,
        }
    }
}

/// One progress event of a scan; the payload is opaque to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub kind: ScanEventKind,
    pub payload: serde_json::Value,
}

/// Terminal payload of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanCompletion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub risk_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub narrative: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub findings: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub online: bool,
    pub env: Option<String>,
}

impl HealthStatus {
    pub fn offline() -> Self {
        Self {
            online: false,
            env: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub scan_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub created_at: String,
}
