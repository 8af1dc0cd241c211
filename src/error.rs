//! Error type for the client library layer.
//!
//! Application layers (CLI, TUI, controller) wrap these in `anyhow` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, body read error, request timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered, but not with a success status.
    #[error("HTTP {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend returned `success: false`.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("malformed `{event}` event payload: {source}")]
    MalformedEvent {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("event stream ended before completion")]
    StreamEnded,

    /// A named `error` event sent by the server.
    #[error("server reported an error: {0}")]
    Server(String),

    #[error("scan timed out")]
    Timeout,

    #[error("scan closed")]
    Closed,

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ClientError {
    /// Short label for status lines.
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Transport(_)
            | ClientError::Status { .. }
            | ClientError::StreamEnded
            | ClientError::Timeout
            | ClientError::Closed => "network",
            ClientError::Decode(_) | ClientError::MalformedEvent { .. } => "payload",
            ClientError::Api { .. } | ClientError::Server(_) => "backend",
            ClientError::InvalidBaseUrl { .. } => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_code_and_message() {
        let e = ClientError::Api {
            code: "INVALID_SQL".into(),
            message: "bad column".into(),
        };
        assert_eq!(e.to_string(), "INVALID_SQL: bad column");
        assert_eq!(e.category(), "backend");
    }

    #[test]
    fn malformed_event_names_the_event() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let e = ClientError::MalformedEvent {
            event: "mission".into(),
            source,
        };
        assert!(e.to_string().starts_with("malformed `mission` event payload"));
        assert_eq!(e.category(), "payload");
    }
}
