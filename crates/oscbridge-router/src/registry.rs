//! Client registry and broadcaster

use dashmap::DashMap;
use oscbridge_core::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{ClientConnection, ClientId};

/// Result of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Clients closed for missing the previous probe
    pub evicted: usize,
    /// Clients sent a new probe
    pub probed: usize,
}

/// The set of live stream clients
///
/// Broadcasts iterate an owned snapshot, so registrations racing a broadcast
/// never change the set being delivered to.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientConnection>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client as open and alive
    pub fn register(&self, client: Arc<ClientConnection>) -> ClientId {
        client.reset();
        let id = client.id.clone();
        debug!("Registered client {} ({})", id, client.remote_addr);
        self.clients.insert(id.clone(), client);
        id
    }

    /// Remove a client; removing an unknown id is a no-op
    pub fn unregister(&self, id: &str) -> Option<Arc<ClientConnection>> {
        let (_, client) = self.clients.remove(id)?;
        client.mark_closed();
        debug!("Unregistered client {} ({})", id, client.remote_addr);
        Some(client)
    }

    /// Deliver a message to every open client
    ///
    /// Serializes once. A client whose queue rejects the frame is removed and
    /// delivery continues with the rest. Returns the number delivered.
    pub fn broadcast(&self, message: &Message) -> usize {
        match serde_json::to_string(message) {
            Ok(json) => self.broadcast_text(&json),
            Err(e) => {
                warn!("Failed to serialize {}: {}", message.address, e);
                0
            }
        }
    }

    /// Deliver an already serialized payload to every open client
    pub fn broadcast_text(&self, text: &str) -> usize {
        let mut delivered = 0;

        for client in self.snapshot() {
            if !client.is_open() {
                self.unregister(&client.id);
                continue;
            }

            match client.deliver(text) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Dropping client {} ({}): {}",
                        client.id, client.remote_addr, e
                    );
                    self.unregister(&client.id);
                }
            }
        }

        delivered
    }

    /// Record a probe answer
    pub fn mark_alive(&self, id: &str) {
        if let Some(client) = self.clients.get(id) {
            client.confirm();
        }
    }

    /// Evict clients that missed the last probe, then probe the rest
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for client in self.snapshot() {
            if !client.is_confirmed() || !client.is_open() {
                info!(
                    "Client {} ({}) failed liveness check",
                    client.id, client.remote_addr
                );
                self.unregister(&client.id);
                client.terminate().await;
                report.evicted += 1;
                continue;
            }

            match client.probe() {
                Ok(()) => report.probed += 1,
                Err(e) => {
                    warn!(
                        "Liveness probe to {} ({}) failed: {}",
                        client.id, client.remote_addr, e
                    );
                    self.unregister(&client.id);
                    report.evicted += 1;
                }
            }
        }

        report
    }

    /// Sweep on a fixed interval until shutdown
    ///
    /// The first sweep runs one interval after start.
    pub async fn run_liveness(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if report.evicted > 0 {
                        info!(
                            "Liveness sweep evicted {} client(s), {} remaining",
                            report.evicted,
                            self.len()
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        debug!("Liveness sweep stopped");
    }

    /// Send a close frame to every client and empty the registry
    ///
    /// A client that cannot take the frame right away is terminated, so one
    /// stalled peer never holds up the others. Returns the clients that were
    /// closed.
    pub async fn close_all(&self, reason: &str) -> Vec<Arc<ClientConnection>> {
        let clients = self.snapshot();
        self.clients.clear();

        for client in &clients {
            client.close_gracefully(reason).await;
        }

        clients
    }

    /// Owned copy of the current membership
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.clients.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
