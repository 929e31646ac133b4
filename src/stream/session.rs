//! Streaming Session
//!
//! The body of one client's event stream. A session moves through
//! `Connecting -> Streaming -> Closed`: it first yields the `connected`
//! acknowledgement, then every frame from its buffer as soon as it arrives,
//! and ends when the hub closes the buffer. The client is unregistered
//! whenever the session closes or is dropped, which covers remote disconnect
//! (the server drops the response body).

use bytes::Bytes;
use futures_util::stream::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::frame::Frame;
use super::hub::{ClientId, HubHandle, Subscription};

/// Lifecycle of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, acknowledgement not yet sent
    Connecting,
    /// Forwarding broadcast frames
    Streaming,
    /// Unregistered; the stream is finished
    Closed,
}

/// One registered client's outbound stream
pub struct Session {
    id: ClientId,
    receiver: mpsc::Receiver<Frame>,
    hub: HubHandle,
    state: SessionState,
}

impl Session {
    pub fn new(hub: HubHandle, subscription: Subscription) -> Self {
        Self {
            id: subscription.id,
            receiver: subscription.receiver,
            hub,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.receiver.close();
        self.hub.unregister_now(self.id);
        tracing::debug!(client_id = %self.id, "Stream closed");
    }
}

impl Stream for Session {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.state {
            SessionState::Connecting => {
                this.state = SessionState::Streaming;
                Poll::Ready(Some(Ok(Frame::connected().into_bytes())))
            }
            SessionState::Streaming => match this.receiver.poll_recv(cx) {
                Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame.into_bytes()))),
                Poll::Ready(None) => {
                    this.close();
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
            SessionState::Closed => Poll::Ready(None),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
