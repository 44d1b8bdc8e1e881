//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// Events produced by a stream connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Text payload received
    Text(String),
    /// Binary payload received
    Data(Bytes),
    /// Liveness probe answered
    Pong(Bytes),
    /// Error occurred
    Error(String),
}

/// Frames that can be written to a stream connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text payload
    Text(String),
    /// Liveness probe
    Ping(Vec<u8>),
    /// Close handshake
    Close { reason: Option<String> },
}

/// Trait for sending to one connection
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Queue a frame, waiting for queue space
    async fn send(&self, frame: OutboundFrame) -> Result<()>;

    /// Queue a frame without waiting; fails when the queue is full or closed
    fn try_send(&self, frame: OutboundFrame) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Start the close handshake
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving from one connection
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Trait for transport servers (listeners)
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// The sender type for accepted connections
    type Sender: TransportSender;
    /// The receiver type for accepted connections
    type Receiver: TransportReceiver;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;
}
