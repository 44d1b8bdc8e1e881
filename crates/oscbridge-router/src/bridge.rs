//! Bridge supervisor
//!
//! Binds all three sockets, runs the inbound listener, the stream server and
//! the liveness sweep as tasks, and stops them together.

use oscbridge_transport::{TransportServer, WebSocketConfig, WebSocketServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{Result, RouterError};
use crate::inbound::InboundListener;
use crate::outbound::OscSender;
use crate::registry::ClientRegistry;
use crate::stream::StreamServer;

const SHUTDOWN_REASON: &str = "server shutting down";

/// A running bridge
pub struct Bridge {
    config: BridgeConfig,
    registry: Arc<ClientRegistry>,
    sender: Arc<OscSender>,
    osc_addr: SocketAddr,
    ws_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<Result<()>>,
}

impl Bridge {
    /// Bind every socket and start the bridge tasks
    ///
    /// Any bind failure is returned before a task is spawned.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ClientRegistry::new());

        let inbound = InboundListener::bind(&config.osc_addr(), Arc::clone(&registry)).await?;
        let osc_addr = inbound.local_addr()?;

        let sender = Arc::new(
            OscSender::bind(&config.outbound.bind, config.outbound_target()).await?,
        );

        let ws_config = WebSocketConfig {
            max_message_size: config.websocket.max_message_size,
            send_queue_capacity: config.websocket.send_queue_capacity,
            ..WebSocketConfig::default()
        };
        let server = WebSocketServer::bind(&config.ws_addr())
            .await
            .map_err(RouterError::bind("WebSocket"))?
            .with_config(ws_config);
        let ws_addr = server.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tasks.spawn(inbound.run(shutdown_rx.clone()));

        let stream = StreamServer::new(Arc::clone(&registry), Arc::clone(&sender));
        let stream_shutdown = shutdown_rx.clone();
        tasks.spawn(async move { stream.serve_on(server, stream_shutdown).await });

        let liveness = Arc::clone(&registry);
        let period = config.liveness_interval();
        tasks.spawn(async move {
            liveness.run_liveness(period, shutdown_rx).await;
            Ok(())
        });

        info!(
            "Bridge running: OSC in {}, WebSocket {}, OSC out {}",
            osc_addr,
            ws_addr,
            sender.default_target()
        );

        Ok(Self {
            config,
            registry,
            sender,
            osc_addr,
            ws_addr,
            shutdown_tx,
            tasks,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bound inbound OSC address
    pub fn osc_addr(&self) -> SocketAddr {
        self.osc_addr
    }

    /// Bound WebSocket address
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Local address of the outbound socket
    pub fn outbound_addr(&self) -> Result<SocketAddr> {
        self.sender.local_addr()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> &Arc<OscSender> {
        &self.sender
    }

    /// Wait for the first bridge task to stop
    ///
    /// Tasks only stop on their own after a fault, so this always resolves to
    /// an error while the bridge is running.
    pub async fn wait(&mut self) -> Result<()> {
        match self.tasks.join_next().await {
            Some(Ok(Ok(()))) => Err(RouterError::Task("bridge task exited unexpectedly".into())),
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(RouterError::Task(e.to_string())),
            None => Ok(()),
        }
    }

    /// Stop every task, then close all clients
    ///
    /// Waits up to the configured shutdown timeout for close frames to be
    /// written. Returns the number of clients closed.
    pub async fn shutdown(mut self) -> usize {
        info!("Shutting down bridge");
        let _ = self.shutdown_tx.send(true);

        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Bridge task failed during shutdown: {}", e),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Bridge task panicked during shutdown: {}", e),
            }
        }

        let closed = self.registry.close_all(SHUTDOWN_REASON).await;

        let deadline = Instant::now() + self.config.shutdown_timeout();
        while closed.iter().any(|c| c.transport_connected()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pending = closed.iter().filter(|c| c.transport_connected()).count();
        if pending > 0 {
            debug!("{} client(s) still flushing at shutdown deadline", pending);
        }

        info!("Bridge stopped, closed {} client(s)", closed.len());
        closed.len()
    }
}
