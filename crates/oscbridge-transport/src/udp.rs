//! UDP datagram transport
//!
//! One socket per role. Receiving runs on its own task so a slow consumer only
//! fills the queue and never blocks the socket read.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// Largest payload that fits in one IPv4 UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// UDP socket settings
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Receive buffer length; longer datagrams are truncated by the OS
    pub max_datagram_size: usize,
    /// Datagrams held between the socket task and the consumer
    pub queue_depth: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            queue_depth: 1024,
        }
    }
}

/// A received datagram
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Bytes,
    pub from: SocketAddr,
}

/// Bound UDP socket
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    pub async fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;

        match socket.local_addr() {
            Ok(local) => info!("UDP socket bound to {}", local),
            Err(_) => info!("UDP socket bound to {}", addr),
        }

        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn the receive task
    ///
    /// The task ends when the returned receiver is dropped.
    pub fn start_receiver(&self) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let task = tokio::spawn(receive_loop(
            Arc::clone(&self.socket),
            self.config.max_datagram_size,
            tx,
        ));

        UdpReceiver { rx, task }
    }

    /// Send one datagram, returning the bytes written
    pub async fn send_to<A: ToSocketAddrs>(&self, data: &[u8], target: A) -> Result<usize> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, buf_len: usize, tx: mpsc::Sender<Datagram>) {
    let mut buf = vec![0u8; buf_len];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms
                warn!("UDP receive error: {}", e);
                continue;
            }
        };

        debug!("UDP datagram of {} bytes from {}", len, from);
        let datagram = Datagram {
            data: Bytes::copy_from_slice(&buf[..len]),
            from,
        };
        if tx.send(datagram).await.is_err() {
            break;
        }
    }
}

/// Consumer side of a receive task
pub struct UdpReceiver {
    rx: mpsc::Receiver<Datagram>,
    task: JoinHandle<()>,
}

impl UdpReceiver {
    /// Next datagram, or `None` once the receive task has stopped
    pub async fn recv(&mut self) -> Option<Datagram> {
        self.rx.recv().await
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}
