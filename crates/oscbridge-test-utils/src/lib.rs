//! Common test helpers for oscbridge tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - In-memory transport endpoints for driving the registry and stream server
//! - Socket clients for end-to-end tests

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use oscbridge_core::{decode_message, Message};
use oscbridge_transport::{
    OutboundFrame, TransportError, TransportEvent, TransportReceiver, TransportSender,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// In-memory transport
// ============================================================================

/// Sender that records frames instead of writing them
///
/// A failing sender reports every frame as rejected by a full queue while
/// still claiming to be connected.
#[derive(Debug)]
pub struct MockSender {
    frames: Mutex<Vec<OutboundFrame>>,
    failing: AtomicBool,
    connected: AtomicBool,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    pub fn failing() -> Self {
        let sender = Self::new();
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Simulate the peer going away
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<OutboundFrame> {
        self.frames.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.frames
            .lock()
            .iter()
            .filter(|frame| matches!(frame, OutboundFrame::Ping(_)))
            .count()
    }

    /// Reason of the first close frame, if one was sent
    pub fn close_reason(&self) -> Option<Option<String>> {
        self.frames.lock().iter().find_map(|frame| match frame {
            OutboundFrame::Close { reason } => Some(reason.clone()),
            _ => None,
        })
    }

    fn record(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::QueueFull);
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.record(frame)
    }

    fn try_send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.record(frame)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.record(OutboundFrame::Close { reason: None });
        self.disconnect();
        Ok(())
    }
}

/// Receiver fed from a channel
pub struct MockReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

/// Create a receiver and the handle that feeds it events
pub fn mock_receiver() -> (mpsc::Sender<TransportEvent>, MockReceiver) {
    let (tx, rx) = mpsc::channel(64);
    (tx, MockReceiver { rx })
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Shared handle to a mock sender with its trait-object form
pub fn mock_sender() -> (Arc<MockSender>, Arc<dyn TransportSender>) {
    let sender = Arc::new(MockSender::new());
    let dynamic: Arc<dyn TransportSender> = sender.clone();
    (sender, dynamic)
}

// ============================================================================
// Socket clients
// ============================================================================

/// WebSocket client speaking the bridge's JSON frames
pub struct WsTestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        Self { ws }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(WsMessage::Text(text.to_string())).await.unwrap();
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) {
        self.ws.send(WsMessage::Binary(data)).await.unwrap();
    }

    /// Next text frame parsed as JSON, skipping control frames
    pub async fn next_json(&mut self, max_wait: Duration) -> Option<Value> {
        let ws = &mut self.ws;
        timeout(max_wait, async move {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(text))) => return serde_json::from_str(&text).ok(),
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return None,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Wait for the server's close frame and return its reason
    pub async fn next_close(&mut self, max_wait: Duration) -> Option<String> {
        let ws = &mut self.ws;
        timeout(max_wait, async move {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Some(frame.map(|f| f.reason.to_string()).unwrap_or_default())
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// UDP socket that decodes what it receives as OSC
pub struct OscTestReceiver {
    socket: UdpSocket,
}

impl OscTestReceiver {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    /// Next datagram decoded as a message
    pub async fn recv(&self, max_wait: Duration) -> Option<Message> {
        let mut buf = vec![0u8; 65536];
        let (len, _) = timeout(max_wait, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Some(decode_message(&buf[..len]))
    }
}

/// Send one raw datagram to `target` from an ephemeral socket
pub async fn send_datagram(target: SocketAddr, data: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(data, target).await.unwrap();
}
