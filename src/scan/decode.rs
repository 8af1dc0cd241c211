use crate::api::SseFrame;
use crate::error::ClientError;
use crate::model::{ScanCompletion, ScanEvent, ScanEventKind};

const COMPLETE_EVENT: &str = "complete";
const ERROR_EVENT: &str = "error";

/// What a single frame means for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Progress(ScanEvent),
    Complete(ScanCompletion),
    /// Server-sent `error` event; ends the session as failed.
    ServerError(String),
    /// Event name the session has no use for (including the default `message`).
    Ignored,
}

/// Decode one frame. Invalid JSON in a payload is a malformed-event error.
pub fn decode_frame(frame: &SseFrame) -> Result<Decoded, ClientError> {
    let malformed = |source: serde_json::Error| ClientError::MalformedEvent {
        event: frame.event.clone(),
        source,
    };

    if let Some(kind) = ScanEventKind::from_event_name(&frame.event) {
        let payload = serde_json::from_str(&frame.data).map_err(malformed)?;
        return Ok(Decoded::Progress(ScanEvent { kind, payload }));
    }

    match frame.event.as_str() {
        COMPLETE_EVENT => serde_json::from_str::<ScanCompletion>(&frame.data)
            .map(Decoded::Complete)
            .map_err(malformed),
        ERROR_EVENT => Ok(Decoded::ServerError(error_message(&frame.data))),
        _ => Ok(Decoded::Ignored),
    }
}

fn error_message(data: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| {
            ["message", "detail", "error"]
                .iter()
                .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(str::to_string))
        });
    match from_json {
        Some(m) if !m.trim().is_empty() => m,
        _ if !data.trim().is_empty() => data.trim().to_string(),
        _ => "unknown error".to_string(),
    }
}
