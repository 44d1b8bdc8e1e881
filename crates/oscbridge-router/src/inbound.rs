//! Inbound OSC listener

use oscbridge_core::decode_bundle;
use oscbridge_transport::UdpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, RouterError};
use crate::registry::ClientRegistry;

/// Receives OSC datagrams and broadcasts every decoded message
pub struct InboundListener {
    transport: UdpTransport,
    registry: Arc<ClientRegistry>,
}

impl InboundListener {
    pub async fn bind(addr: &str, registry: Arc<ClientRegistry>) -> Result<Self> {
        let transport = UdpTransport::bind(addr)
            .await
            .map_err(RouterError::bind("inbound OSC"))?;
        Ok(Self {
            transport,
            registry,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Process datagrams one at a time until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut receiver = self.transport.start_receiver();
        info!("Listening for OSC on {}", self.local_addr()?);

        while !*shutdown.borrow() {
            tokio::select! {
                datagram = receiver.recv() => match datagram {
                    Some(datagram) => {
                        self.handle_datagram(&datagram.data, datagram.from);
                    }
                    None => {
                        return Err(RouterError::Task("inbound receive loop ended".into()));
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        debug!("Inbound listener stopped");
        Ok(())
    }

    /// Decode one datagram and broadcast its messages in order
    ///
    /// Returns the number of messages decoded.
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> usize {
        let messages = decode_bundle(data);
        if messages.is_empty() {
            debug!("No OSC messages in {} byte datagram from {}", data.len(), from);
            return 0;
        }

        for message in &messages {
            let delivered = self.registry.broadcast(message);
            debug!("OSC {} from {} -> {} client(s)", message, from, delivered);
        }

        messages.len()
    }
}
