//! Outbound OSC sender
//!
//! Owns a UDP socket used only for sending, separate from the inbound
//! listener's socket.

use oscbridge_core::{encode_message, Argument, Message};
use oscbridge_transport::UdpTransport;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::error::{Result, RouterError};
use crate::stream::AnalysisEvent;

/// Destination for outbound packets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundTarget {
    pub host: String,
    pub port: u16,
}

impl OutboundTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for OutboundTarget {
    fn default() -> Self {
        Self::new("127.0.0.1", oscbridge_core::DEFAULT_OUTBOUND_PORT)
    }
}

impl fmt::Display for OutboundTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for OutboundTarget {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Sends OSC messages as UDP datagrams
pub struct OscSender {
    transport: UdpTransport,
    default_target: OutboundTarget,
}

impl OscSender {
    /// Bind the sending socket
    pub async fn bind(bind_addr: &str, default_target: OutboundTarget) -> Result<Self> {
        let transport = UdpTransport::bind(bind_addr)
            .await
            .map_err(RouterError::bind("outbound OSC"))?;

        Ok(Self {
            transport,
            default_target,
        })
    }

    pub fn default_target(&self) -> &OutboundTarget {
        &self.default_target
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Encode and send one message
    ///
    /// `target` overrides the default destination for this call only.
    /// Returns the number of bytes sent.
    pub async fn send(
        &self,
        address: &str,
        args: Vec<Argument>,
        target: Option<&OutboundTarget>,
    ) -> Result<usize> {
        let target = target.unwrap_or(&self.default_target);
        if target.host.is_empty() {
            return Err(RouterError::InvalidTarget(target.to_string()));
        }

        let message = Message::new(address, args);
        let bytes = encode_message(&message)?;

        let sent = self
            .transport
            .send_to(&bytes, (target.host.as_str(), target.port))
            .await?;

        debug!("Sent OSC {} ({} bytes) to {}", message, sent, target);
        Ok(sent)
    }

    /// Send to the default target, logging instead of returning failures
    pub async fn forward(&self, address: &str, args: Vec<Argument>) -> bool {
        match self.send(address, args, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Outbound OSC {} to {} failed: {}",
                    address, self.default_target, e
                );
                false
            }
        }
    }

    /// Forward a client analysis event; failures are logged, never returned
    pub async fn send_analysis(&self, event: &AnalysisEvent) -> bool {
        match event.to_message() {
            Ok(message) => self.forward(&message.address, message.args).await,
            Err(e) => {
                warn!("Dropping analysis event {}: {}", event.address, e);
                false
            }
        }
    }
}
