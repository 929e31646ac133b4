//! Broadcast Hub
//!
//! Single authority over which clients exist. The registry lives inside one
//! task and is only touched while that task processes a `Command`, so
//! commands are applied strictly one at a time in arrival order and the map
//! needs no lock. Everything else talks to the hub through a [`HubHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::frame::Frame;

/// Unique registration token of a streaming client
pub type ClientId = Uuid;

/// Configuration for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per client before new frames are dropped
    pub client_buffer: usize,
    /// Commands queued for the hub task before broadcasts are dropped
    pub mailbox: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_buffer: 8,
            mailbox: 64,
        }
    }
}

/// A registered client's end of its channel
#[derive(Debug)]
pub struct Subscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Frame>,
}

enum Command {
    Register {
        id: ClientId,
        sender: mpsc::Sender<Frame>,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: ClientId,
        ack: Option<oneshot::Sender<()>>,
    },
    Broadcast(Frame),
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// The hub task's state
pub struct Hub {
    clients: HashMap<ClientId, mpsc::Sender<Frame>>,
    commands: mpsc::Receiver<Command>,
    count: Arc<AtomicUsize>,
}

/// Cloneable front door to a running hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    count: Arc<AtomicUsize>,
    client_buffer: usize,
}

impl Hub {
    /// Create a hub and its handle. The hub does nothing until [`Hub::run`].
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(config.mailbox.max(1));
        let count = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            clients: HashMap::new(),
            commands: rx,
            count: Arc::clone(&count),
        };
        let handle = HubHandle {
            commands: tx,
            count,
            client_buffer: config.client_buffer.max(1),
        };
        (hub, handle)
    }

    /// Create a hub and run it on a new task until `cancel` fires
    pub fn spawn(config: HubConfig, cancel: CancellationToken) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config);
        let task = tokio::spawn(hub.run(cancel));
        (handle, task)
    }

    /// Process commands until cancelled, shut down, or every handle is gone.
    /// On exit every client channel is closed.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Hub cancelled");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.close_all();
    }

    /// Apply one command; false means the hub should stop
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Register { id, sender, ack } => {
                self.clients.insert(id, sender);
                self.publish_count();
                tracing::info!(client_id = %id, clients = self.clients.len(), "Client connected");
                let _ = ack.send(());
            }
            Command::Unregister { id, ack } => {
                // Dropping the sender closes the client's channel
                if self.clients.remove(&id).is_some() {
                    self.publish_count();
                    tracing::info!(client_id = %id, clients = self.clients.len(), "Client disconnected");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Command::Broadcast(frame) => self.broadcast(&frame),
            Command::Shutdown { ack } => {
                self.close_all();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn broadcast(&mut self, frame: &Frame) {
        let mut gone = Vec::new();

        for (id, sender) in &self.clients {
            match sender.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(client_id = %id, "Client buffer full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        if !gone.is_empty() {
            for id in &gone {
                self.clients.remove(id);
                tracing::info!(client_id = %id, clients = self.clients.len(), "Client disconnected");
            }
            self.publish_count();
        }
    }

    fn close_all(&mut self) {
        if !self.clients.is_empty() {
            tracing::info!(clients = self.clients.len(), "Closing all client streams");
        }
        self.clients.clear();
        self.publish_count();
        self.commands.close();
    }

    fn publish_count(&self) {
        self.count.store(self.clients.len(), Ordering::Release);
    }
}

impl HubHandle {
    /// Register a new client with a fresh id and bounded buffer.
    ///
    /// Returns once the hub has inserted the client, so it is counted and
    /// receives every broadcast issued after this call returns.
    pub async fn register(&self) -> Result<Subscription, HubError> {
        let (sender, receiver) = mpsc::channel(self.client_buffer);
        let id = Uuid::new_v4();
        let (ack, acked) = oneshot::channel();

        self.commands
            .send(Command::Register { id, sender, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        acked.await.map_err(|_| HubError::Closed)?;

        Ok(Subscription { id, receiver })
    }

    /// Remove a client and close its channel. No-op for unknown ids.
    pub async fn unregister(&self, id: ClientId) {
        let (ack, acked) = oneshot::channel();
        if self
            .commands
            .send(Command::Unregister { id, ack: Some(ack) })
            .await
            .is_ok()
        {
            let _ = acked.await;
        }
    }

    /// Non-blocking unregister for use from `Drop`.
    ///
    /// If the mailbox is full the request is dropped; the hub then reaps the
    /// client on the next broadcast because its receiver is gone.
    pub fn unregister_now(&self, id: ClientId) {
        if let Err(TrySendError::Full(_)) = self.commands.try_send(Command::Unregister { id, ack: None }) {
            tracing::debug!(client_id = %id, "Hub mailbox full, client will be reaped on next broadcast");
        }
    }

    /// Queue `frame` for every registered client without waiting.
    ///
    /// Returns false if the frame was dropped because the hub is busy or gone.
    pub fn broadcast(&self, frame: Frame) -> bool {
        match self.commands.try_send(Command::Broadcast(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Hub mailbox full, broadcast dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close every client channel and stop the hub
    pub async fn shutdown(&self) {
        let (ack, acked) = oneshot::channel();
        if self.commands.send(Command::Shutdown { ack }).await.is_ok() {
            let _ = acked.await;
        }
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the hub task has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Errors that can occur in the broadcast hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Broadcast hub is shut down")]
    Closed,
}
