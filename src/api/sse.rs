//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; frames are emitted only once their
//! terminating blank line has been seen.

use crate::error::ClientError;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    /// Previous chunk ended on `\r`; a leading `\n` in the next chunk belongs to it.
    skip_lf: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut chunk = chunk;
        if self.skip_lf && !chunk.is_empty() {
            self.skip_lf = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let line = self.buf.split_to(pos);
            let terminator = self.buf[0];
            self.buf.advance(1);
            if terminator == b'\r' {
                if self.buf.is_empty() {
                    self.skip_lf = true;
                } else if self.buf[0] == b'\n' {
                    self.buf.advance(1);
                }
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of stream. An event without its terminating blank line is discarded.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if !self.buf.is_empty() {
            tracing::debug!(bytes = self.buf.len(), "discarding unterminated event-stream line");
        }
        self.buf.clear();
        self.reset_event();
        Vec::new()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            // `retry` only matters to auto-reconnecting clients; we never reconnect.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_data {
            self.reset_event();
            return None;
        }
        let event = self
            .event
            .take()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        let frame = SseFrame {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
        };
        self.reset_event();
        Some(frame)
    }

    fn reset_event(&mut self) {
        self.event = None;
        self.data.clear();
        self.has_data = false;
    }
}

/// Turn a byte stream into a stream of decoded frames. A body error is yielded once
/// and ends the stream.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<SseFrame, ClientError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<ClientError>,
{
    struct St<S> {
        body: S,
        decoder: SseDecoder,
        queue: VecDeque<SseFrame>,
        done: bool,
    }

    let init = St {
        body,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(init, |mut st| async move {
        loop {
            if let Some(frame) = st.queue.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let decoded = st.decoder.feed(chunk.as_ref());
                    st.queue.extend(decoded);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.done = true;
                    let decoded = st.decoder.finish();
                    st.queue.extend(decoded);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseFrame> {
        let mut dec = SseDecoder::new();
        let mut out = Vec::new();
        for c in chunks {
            out.extend(dec.feed(c));
        }
        out.extend(dec.finish());
        out
    }

    const BODY: &[u8] = b"event: status\ndata: {\"status\": \"started\"}\n\n\
event: mission\ndata: {\"mission_id\": \"failed_logins\"}\n\n\
event: complete\ndata: {\"risk_score\": 12}\n\n";

    #[test]
    fn decodes_named_events() {
        let frames = decode_all(&[BODY]);
        let names: Vec<_> = frames.iter().map(|f| f.event.as_str()).collect();
        assert_eq!(names, ["status", "mission", "complete"]);
        assert_eq!(frames[0].data, "{\"status\": \"started\"}");
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let whole = decode_all(&[BODY]);
        for split in 1..BODY.len() {
            let (a, b) = BODY.split_at(split);
            assert_eq!(decode_all(&[a, b]), whole, "split at {split}");
        }
        let bytewise: Vec<&[u8]> = BODY.chunks(1).collect();
        assert_eq!(decode_all(&bytewise), whole);
    }

    #[test]
    fn handles_crlf_and_lone_cr() {
        let crlf = decode_all(&[b"event: status\r\ndata: 1\r\n\r\n"]);
        let cr = decode_all(&[b"event: status\rdata: 1\r\r"]);
        let split_crlf = decode_all(&[b"event: status\r", b"\ndata: 1\r", b"\n\r", b"\n"]);
        let expected = vec![SseFrame::new("status", "1")];
        assert_eq!(crlf, expected);
        assert_eq!(cr, expected);
        assert_eq!(split_crlf, expected);
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let frames = decode_all(&[b": keep-alive\nevent: mission\ndata: {\ndata:  \"a\": 1\ndata: }\n\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\n \"a\": 1\n}");
    }

    #[test]
    fn unnamed_event_defaults_to_message() {
        let frames = decode_all(&[b"data: hello\n\n"]);
        assert_eq!(frames, vec![SseFrame::new("message", "hello")]);
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let frames = decode_all(&[b"event: status\n\nevent: mission\ndata: x\n\n"]);
        assert_eq!(frames, vec![SseFrame::new("mission", "x")]);
    }

    #[test]
    fn unterminated_trailing_event_is_dropped() {
        let frames = decode_all(&[b"event: status\ndata: 1\n\nevent: complete\ndata: {}\n"]);
        assert_eq!(frames, vec![SseFrame::new("status", "1")]);
    }

    #[test]
    fn id_is_carried_on_frames() {
        let frames = decode_all(&[b"id: 7\nevent: status\ndata: 1\n\n"]);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn frames_stream_yields_body_error_last() {
        let chunks: Vec<Result<&'static [u8], ClientError>> = vec![
            Ok(b"event: status\ndata: 1\n\n"),
            Err(ClientError::StreamEnded),
        ];
        let out: Vec<_> = frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &SseFrame::new("status", "1"));
        assert!(matches!(out[1], Err(ClientError::StreamEnded)));
    }
}
