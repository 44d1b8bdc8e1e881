//! Connected stream clients

use oscbridge_transport::{OutboundFrame, TransportError, TransportSender};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Client identifier
pub type ClientId = String;

/// Whether the connection may still be written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Open,
    Closed,
}

/// Outcome of the most recent liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The peer answered since the last sweep
    Confirmed,
    /// A probe is outstanding
    Unconfirmed,
}

/// Per-connection state record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientState {
    pub status: ClientStatus,
    pub liveness: Liveness,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            status: ClientStatus::Open,
            liveness: Liveness::Confirmed,
        }
    }
}

/// A connected stream client
///
/// State transitions are crate-private; the registry drives them.
pub struct ClientConnection {
    /// Unique client ID
    pub id: ClientId,
    /// Peer address, for diagnostics only
    pub remote_addr: SocketAddr,
    /// Connection time
    pub connected_at: Instant,
    sender: Arc<dyn TransportSender>,
    state: Mutex<ClientState>,
}

impl ClientConnection {
    pub fn new(sender: Arc<dyn TransportSender>, remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            connected_at: Instant::now(),
            sender,
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    /// Open in our records and on the transport
    pub fn is_open(&self) -> bool {
        self.state.lock().status == ClientStatus::Open && self.sender.is_connected()
    }

    /// Whether the transport still has a writer, even after we closed it
    pub fn transport_connected(&self) -> bool {
        self.sender.is_connected()
    }

    pub fn is_confirmed(&self) -> bool {
        self.state.lock().liveness == Liveness::Confirmed
    }

    /// Queue a text frame without waiting
    pub(crate) fn deliver(&self, text: &str) -> Result<(), TransportError> {
        self.sender.try_send(OutboundFrame::Text(text.to_string()))
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = ClientState::default();
    }

    pub(crate) fn confirm(&self) {
        self.state.lock().liveness = Liveness::Confirmed;
    }

    /// Mark the probe outstanding and send it
    pub(crate) fn probe(&self) -> Result<(), TransportError> {
        self.state.lock().liveness = Liveness::Unconfirmed;
        self.sender.try_send(OutboundFrame::Ping(Vec::new()))
    }

    pub(crate) fn mark_closed(&self) {
        self.state.lock().status = ClientStatus::Closed;
    }

    /// Close immediately, without waiting for queued frames
    pub(crate) async fn terminate(&self) {
        self.mark_closed();
        let _ = self.sender.close().await;
    }

    /// Queue a close frame behind any pending frames
    ///
    /// Never waits for queue space. A client with a full queue is terminated
    /// instead.
    pub(crate) async fn close_gracefully(&self, reason: &str) {
        self.mark_closed();
        let frame = OutboundFrame::Close {
            reason: Some(reason.to_string()),
        };
        if let Err(TransportError::QueueFull) = self.sender.try_send(frame) {
            let _ = self.sender.close().await;
        }
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}
