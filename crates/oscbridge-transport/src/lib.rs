//! oscbridge transport layer
//!
//! This crate provides the socket plumbing for the bridge:
//! - UDP (inbound OSC receive loop, outbound datagrams)
//! - WebSocket server (one writer and one reader task per connection)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{
    OutboundFrame, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketReceiver, WebSocketSender, WebSocketServer};

#[cfg(feature = "udp")]
pub use udp::{Datagram, UdpConfig, UdpReceiver, UdpTransport, MAX_DATAGRAM_SIZE};
