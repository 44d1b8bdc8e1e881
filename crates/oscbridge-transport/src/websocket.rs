//! WebSocket server transport
//!
//! Each accepted connection gets a writer task fed by a bounded queue and a
//! reader task that turns frames into [`TransportEvent`]s. Either task ending
//! marks the connection closed.
//!
//! Opening handshakes run on their own tasks, so a peer that never upgrades
//! only occupies its own slot until the handshake timeout.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_tungstenite::{
    accept_async_with_config,
    tungstenite::protocol::{
        frame::coding::CloseCode, CloseFrame, Message as WsMessage,
        WebSocketConfig as ProtocolConfig,
    },
    WebSocketStream,
};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{
    OutboundFrame, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;
type Accepted = (WebSocketSender, WebSocketReceiver, SocketAddr);

/// Events buffered per connection ahead of the consumer
const EVENT_QUEUE_DEPTH: usize = 64;

/// Server-side limits
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Largest accepted message and frame
    pub max_message_size: usize,
    /// Frames queued per connection before `try_send` reports it full
    pub send_queue_capacity: usize,
    /// Upper bound on the opening handshake
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl WebSocketConfig {
    fn protocol(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// Write half of an accepted connection
pub struct WebSocketSender {
    queue: mpsc::Sender<OutboundFrame>,
    open: Arc<AtomicBool>,
}

impl WebSocketSender {
    fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.ensure_open()?;
        self.queue
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.ensure_open()?;
        self.queue.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        let _ = self.queue.try_send(OutboundFrame::Close { reason: None });
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

/// Read half of an accepted connection
pub struct WebSocketReceiver {
    events: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Listening WebSocket server
pub struct WebSocketServer {
    listener: TcpListener,
    config: WebSocketConfig,
    handshakes: JoinSet<Result<Accepted>>,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;

        match listener.local_addr() {
            Ok(local) => info!("WebSocket server listening on {}", local),
            Err(_) => info!("WebSocket server listening on {}", addr),
        }

        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
            handshakes: JoinSet::new(),
        })
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    /// Next connection to finish its handshake
    ///
    /// Keeps accepting TCP connections while earlier handshakes are pending.
    /// A failed or timed out handshake is returned as an error; the server
    /// stays usable.
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        loop {
            tokio::select! {
                Some(done) = self.handshakes.join_next() => match done {
                    Ok(result) => return result,
                    Err(e) => debug!("Handshake task failed: {}", e),
                },
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("TCP connection from {}", peer);
                    self.handshakes.spawn(handshake(stream, peer, self.config.clone()));
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Upgrade one TCP connection and start its reader and writer
async fn handshake(
    stream: TcpStream,
    peer: SocketAddr,
    config: WebSocketConfig,
) -> Result<Accepted> {
    let upgrade = accept_async_with_config(stream, Some(config.protocol()));
    let ws = tokio::time::timeout(config.handshake_timeout, upgrade)
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", peer, e)))?;

    let (sink, source) = ws.split();
    let (queue_tx, queue_rx) = mpsc::channel(config.send_queue_capacity);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let open = Arc::new(AtomicBool::new(true));

    tokio::spawn(write_frames(sink, queue_rx, Arc::clone(&open), peer));
    tokio::spawn(read_frames(source, event_tx, Arc::clone(&open)));

    Ok((
        WebSocketSender {
            queue: queue_tx,
            open,
        },
        WebSocketReceiver { events: event_rx },
        peer,
    ))
}

fn to_ws_message(frame: OutboundFrame) -> WsMessage {
    match frame {
        OutboundFrame::Text(text) => WsMessage::Text(text),
        OutboundFrame::Ping(payload) => WsMessage::Ping(payload),
        OutboundFrame::Close { reason } => WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.unwrap_or_default().into(),
        })),
    }
}

/// Drain the queue into the socket; a close frame is the last frame written
async fn write_frames(
    mut sink: WsSink,
    mut queue: mpsc::Receiver<OutboundFrame>,
    open: Arc<AtomicBool>,
    peer: SocketAddr,
) {
    while let Some(frame) = queue.recv().await {
        let last = matches!(frame, OutboundFrame::Close { .. });
        if let Err(e) = sink.send(to_ws_message(frame)).await {
            debug!("WebSocket write to {} failed: {}", peer, e);
            break;
        }
        if last {
            break;
        }
    }
    open.store(false, Ordering::Release);
}

async fn read_frames(
    mut source: WsSource,
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
) {
    let _ = events.send(TransportEvent::Connected).await;

    while let Some(result) = source.next().await {
        let event = match result {
            Ok(WsMessage::Text(text)) => TransportEvent::Text(text),
            Ok(WsMessage::Binary(data)) => TransportEvent::Data(Bytes::from(data)),
            Ok(WsMessage::Pong(data)) => TransportEvent::Pong(Bytes::from(data)),
            Ok(WsMessage::Close(frame)) => {
                let reason = frame.map(|f| f.reason.to_string());
                let _ = events.send(TransportEvent::Disconnected { reason }).await;
                break;
            }
            // tungstenite answers client pings itself
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Frame(_)) => continue,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                let _ = events
                    .send(TransportEvent::Disconnected {
                        reason: Some(e.to_string()),
                    })
                    .await;
                break;
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }

    open.store(false, Ordering::Release);
}
