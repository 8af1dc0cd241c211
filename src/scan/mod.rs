//! Streamed Sentinel scan sessions.
//!
//! A session connects through a [`ScanConnector`], decodes server-sent frames in
//! arrival order and reports every state change as a [`ScanUpdate`] on one channel.
//! Starting a new session tears down the previous one first.

mod decode;
mod session;

use crate::api::SseFrame;
use crate::error::ClientError;
use crate::model::Domain;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

pub use decode::{decode_frame, Decoded};
pub use session::{ScanSession, ScanUpdate, ScanUpdateKind, SessionHandle, SessionId};

/// Open event stream of one scan. Dropping it closes the underlying connection.
pub type FrameStream = BoxStream<'static, Result<SseFrame, ClientError>>;

/// Opens scan event streams. Implemented by the HTTP client and by test doubles.
pub trait ScanConnector: Send + Sync + 'static {
    /// Resolves once the handshake succeeded; a non-OK handshake is an error.
    fn connect(&self, domain: Domain) -> BoxFuture<'static, Result<FrameStream, ClientError>>;
}
