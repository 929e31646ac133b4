//! Event-Stream Frames
//!
//! Text frames in the `text/event-stream` format. A frame is encoded once
//! by the producer and then shared by every client, so it wraps cheaply
//! cloneable [`Bytes`].

use bytes::Bytes;
use serde::Serialize;

/// Event type used for metrics updates; browsers deliver it to `onmessage`
pub const METRICS_EVENT: &str = "message";

/// Event type of the acknowledgement sent when a client connects
pub const CONNECTED_EVENT: &str = "connected";

/// One self-contained, already encoded push message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// `event: <kind>\ndata: <data>\n\n`
    ///
    /// `data` must be a single line; JSON from `serde_json::to_string` is.
    pub fn event(kind: &str, data: &str) -> Self {
        Self(Bytes::from(format!("event: {kind}\ndata: {data}\n\n")))
    }

    /// Event frame carrying `payload` serialized as JSON
    pub fn json<T: Serialize>(kind: &str, payload: &T) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_string(payload)?;
        Ok(Self::event(kind, &data))
    }

    /// Comment frame, ignored by clients but keeps intermediaries from
    /// timing out an idle connection
    pub fn comment(text: &str) -> Self {
        Self(Bytes::from(format!(": {text}\n\n")))
    }

    /// Keepalive sent on every heartbeat tick
    pub fn heartbeat() -> Self {
        Self::comment("ping")
    }

    /// First frame on every stream
    pub fn connected() -> Self {
        Self::event(CONNECTED_EVENT, r#"{"message":"Connected"}"#)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}
