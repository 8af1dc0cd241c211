use super::decode::{decode_frame, Decoded};
use super::ScanConnector;
use crate::error::ClientError;
use crate::model::{Domain, ScanCompletion, ScanEvent};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Monotonic per-`ScanSession` counter; the first session is 1.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: SessionId,
    pub domain: Domain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdateKind {
    /// Always the first update of a session; emitted before the connection is opened.
    Started { domain: Domain },
    /// Handshake succeeded.
    Connected,
    Event(ScanEvent),
    Completed(ScanCompletion),
    Failed(String),
}

impl ScanUpdateKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanUpdateKind::Completed(_) | ScanUpdateKind::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanUpdate {
    pub session: SessionId,
    pub kind: ScanUpdateKind,
}

struct ActiveScan {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// Owns the one open scan. Latest `start` wins.
pub struct ScanSession {
    connector: Arc<dyn ScanConnector>,
    updates: UnboundedSender<ScanUpdate>,
    timeout: Option<Duration>,
    next_id: SessionId,
    current: Option<ActiveScan>,
}

impl ScanSession {
    pub fn new(connector: Arc<dyn ScanConnector>, updates: UnboundedSender<ScanUpdate>) -> Self {
        Self {
            connector,
            updates,
            timeout: None,
            next_id: 0,
            current: None,
        }
    }

    /// Whole-session deadline. Elapsing is reported like a transport error.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current(&self) -> Option<SessionHandle> {
        self.current.as_ref().map(|a| a.handle)
    }

    /// True while the current session's pump is still running.
    pub fn is_open(&self) -> bool {
        self.current
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Close any previous session, then start a new one for `domain`.
    ///
    /// Returns once the previous transport is gone and the new pump is spawned; it
    /// does not wait for the new connection.
    pub async fn start(&mut self, domain: Domain) -> SessionHandle {
        if let Some(prev) = self.current.take() {
            tracing::info!(session = prev.handle.id, "superseding open scan");
            teardown(prev.task).await;
        }

        self.next_id += 1;
        let handle = SessionHandle {
            id: self.next_id,
            domain,
        };
        let _ = self.updates.send(ScanUpdate {
            session: handle.id,
            kind: ScanUpdateKind::Started { domain },
        });
        tracing::info!(session = handle.id, %domain, "scan started");

        let task = tokio::spawn(pump(
            self.connector.clone(),
            handle,
            self.updates.clone(),
            self.timeout,
        ));
        self.current = Some(ActiveScan { handle, task });
        handle
    }

    /// Close the current session. A session that had not reached a terminal state is
    /// reported as failed. Returns false when nothing was open.
    pub async fn close(&mut self) -> bool {
        let Some(active) = self.current.take() else {
            return false;
        };
        let was_running = !active.task.is_finished();
        teardown(active.task).await;
        if was_running {
            tracing::info!(session = active.handle.id, "scan closed by caller");
            let _ = self.updates.send(ScanUpdate {
                session: active.handle.id,
                kind: ScanUpdateKind::Failed(ClientError::Closed.to_string()),
            });
        }
        true
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(active) = self.current.take() {
            active.task.abort();
        }
    }
}

/// Abort the pump and wait until its future (and with it the stream) is dropped.
async fn teardown(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}

async fn pump(
    connector: Arc<dyn ScanConnector>,
    handle: SessionHandle,
    tx: UnboundedSender<ScanUpdate>,
    timeout: Option<Duration>,
) {
    let emit = |kind: ScanUpdateKind| {
        let _ = tx.send(ScanUpdate {
            session: handle.id,
            kind,
        });
    };

    let run = drive(connector.as_ref(), handle.domain, &emit);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or(Err(ClientError::Timeout)),
        None => run.await,
    };

    match outcome {
        Ok(completion) => {
            tracing::info!(
                session = handle.id,
                risk_score = completion.risk_score,
                findings = completion.findings.len(),
                "scan completed"
            );
            emit(ScanUpdateKind::Completed(completion));
        }
        Err(e) => {
            tracing::warn!(session = handle.id, error = %e, "scan failed");
            emit(ScanUpdateKind::Failed(e.to_string()));
        }
    }
}

/// Read frames until the terminal one. The stream is dropped (closed) on return.
async fn drive(
    connector: &dyn ScanConnector,
    domain: Domain,
    emit: &(dyn Fn(ScanUpdateKind) + Sync),
) -> Result<ScanCompletion, ClientError> {
    let mut stream = connector.connect(domain).await?;
    emit(ScanUpdateKind::Connected);

    while let Some(frame) = stream.next().await {
        let frame = frame?;
        match decode_frame(&frame)? {
            Decoded::Progress(event) => {
                tracing::debug!(kind = event.kind.as_str(), "scan event");
                emit(ScanUpdateKind::Event(event));
            }
            Decoded::Complete(completion) => return Ok(completion),
            Decoded::ServerError(message) => return Err(ClientError::Server(message)),
            Decoded::Ignored => {
                tracing::debug!(event = %frame.event, "ignoring unrecognised scan event");
            }
        }
    }

    Err(ClientError::StreamEnded)
}
