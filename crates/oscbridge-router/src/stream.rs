//! WebSocket stream server
//!
//! Accepts stream clients, registers them for broadcasts and forwards their
//! analysis events as outbound OSC.

use oscbridge_core::{Argument, Message};
use oscbridge_transport::{
    TransportError, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::client::{ClientConnection, ClientId};
use crate::error::{Result, RouterError};
use crate::outbound::OscSender;
use crate::registry::ClientRegistry;

/// Payloads a client may send, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientPayload {
    Analysis(AnalysisEvent),
}

/// Audio analysis result to be forwarded as OSC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub address: String,
    pub args: Vec<Value>,
}

impl AnalysisEvent {
    /// Parse a client payload, returning `None` for anything not actionable
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<ClientPayload>(text) {
            Ok(ClientPayload::Analysis(event)) if !event.address.is_empty() => Some(event),
            Ok(ClientPayload::Analysis(_)) => {
                trace!("Ignoring analysis payload without an address");
                None
            }
            Err(e) => {
                trace!("Ignoring client payload: {}", e);
                None
            }
        }
    }

    /// Convert to an OSC message, failing on arguments with no OSC form
    pub fn to_message(&self) -> Result<Message> {
        let args = self
            .args
            .iter()
            .map(json_to_argument)
            .collect::<Result<Vec<_>>>()?;
        Ok(Message::new(self.address.clone(), args))
    }
}

/// Map a JSON value to the OSC argument it is sent as
///
/// Integer-valued numbers that fit an `i32` become `Int`, every other number
/// becomes `Float`.
pub fn json_to_argument(value: &Value) -> Result<Argument> {
    match value {
        Value::Bool(b) => Ok(Argument::Bool(*b)),
        Value::String(s) => Ok(Argument::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(i) = i32::try_from(i) {
                    return Ok(Argument::Int(i));
                }
            }
            let f = n
                .as_f64()
                .ok_or_else(|| RouterError::InvalidArgument(n.to_string()))?;
            if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
                Ok(Argument::Int(f as i32))
            } else {
                Ok(Argument::Float(f as f32))
            }
        }
        other => Err(RouterError::InvalidArgument(other.to_string())),
    }
}

/// Accept loop and per-connection handling
#[derive(Clone)]
pub struct StreamServer {
    registry: Arc<ClientRegistry>,
    sender: Arc<OscSender>,
}

impl StreamServer {
    pub fn new(registry: Arc<ClientRegistry>, sender: Arc<OscSender>) -> Self {
        Self { registry, sender }
    }

    /// Accept connections from `server` until shutdown is signalled
    pub async fn serve_on<S>(
        &self,
        mut server: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!("Stream server accepting connections");

        while !*shutdown.borrow() {
            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, addr)) => {
                        self.handle_connection(Arc::new(sender), receiver, addr);
                    }
                    Err(TransportError::Io(e)) => {
                        warn!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => {
                        debug!("Handshake failed: {}", e);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        info!("Stream server stopped accepting connections");
        Ok(())
    }

    /// Register a connection and spawn its reader
    pub fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) -> ClientId {
        let client = Arc::new(ClientConnection::new(sender, addr));
        let id = self.registry.register(client);
        info!("Client {} connected from {} ({} total)", id, addr, self.registry.len());

        tokio::spawn(run_connection(
            Arc::clone(&self.registry),
            Arc::clone(&self.sender),
            id.clone(),
            receiver,
            addr,
        ));

        id
    }
}

/// Unregisters its client when dropped, including when the reader panics
struct Registration {
    registry: Arc<ClientRegistry>,
    id: ClientId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

async fn run_connection(
    registry: Arc<ClientRegistry>,
    sender: Arc<OscSender>,
    id: ClientId,
    mut receiver: impl TransportReceiver,
    addr: SocketAddr,
) {
    let _registration = Registration {
        registry: Arc::clone(&registry),
        id: id.clone(),
    };

    loop {
        match receiver.recv().await {
            Some(TransportEvent::Text(text)) => {
                if let Some(event) = AnalysisEvent::parse(&text) {
                    sender.send_analysis(&event).await;
                }
            }
            Some(TransportEvent::Data(data)) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    if let Some(event) = AnalysisEvent::parse(text) {
                        sender.send_analysis(&event).await;
                    }
                }
                Err(_) => trace!("Ignoring non UTF-8 binary frame from {}", addr),
            },
            Some(TransportEvent::Pong(_)) => registry.mark_alive(&id),
            Some(TransportEvent::Disconnected { reason }) => {
                info!("Client {} ({}) disconnected: {:?}", id, addr, reason);
                break;
            }
            Some(TransportEvent::Error(e)) => {
                debug!("Transport error from {}: {}", addr, e);
                break;
            }
            Some(TransportEvent::Connected) => {}
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_analysis() {
        let event =
            AnalysisEvent::parse(r#"{"type":"analysis","address":"/audio/rms","args":[0.5]}"#)
                .unwrap();
        assert_eq!(event.address, "/audio/rms");
        assert_eq!(event.args, vec![json!(0.5)]);
    }

    #[test]
    fn test_parse_ignores_other_shapes() {
        for text in [
            "not json",
            "[]",
            r#"{"type":"hello"}"#,
            r#"{"address":"/a","args":[]}"#,
            r#"{"type":"analysis","args":[1]}"#,
            r#"{"type":"analysis","address":"","args":[1]}"#,
            r#"{"type":"analysis","address":"/a"}"#,
            r#"{"type":"analysis","address":7,"args":[]}"#,
        ] {
            assert_eq!(AnalysisEvent::parse(text), None, "{}", text);
        }
    }

    #[test]
    fn test_number_mapping() {
        assert_eq!(json_to_argument(&json!(7)).unwrap(), Argument::Int(7));
        assert_eq!(json_to_argument(&json!(-3)).unwrap(), Argument::Int(-3));
        assert_eq!(json_to_argument(&json!(2.0)).unwrap(), Argument::Int(2));
        assert_eq!(json_to_argument(&json!(0.25)).unwrap(), Argument::Float(0.25));
        assert_eq!(
            json_to_argument(&json!(4_000_000_000i64)).unwrap(),
            Argument::Float(4_000_000_000.0)
        );
    }

    #[test]
    fn test_other_mappings() {
        assert_eq!(json_to_argument(&json!(true)).unwrap(), Argument::Bool(true));
        assert_eq!(
            json_to_argument(&json!("kick")).unwrap(),
            Argument::String("kick".into())
        );
        assert!(matches!(
            json_to_argument(&json!(null)),
            Err(RouterError::InvalidArgument(_))
        ));
        assert!(json_to_argument(&json!([1])).is_err());
        assert!(json_to_argument(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_to_message() {
        let event = AnalysisEvent {
            address: "/audio/bands".into(),
            args: vec![json!(1), json!(0.5), json!("low")],
        };
        assert_eq!(
            event.to_message().unwrap(),
            Message::new(
                "/audio/bands",
                vec![Argument::Int(1), Argument::Float(0.5), Argument::String("low".into())]
            )
        );
    }
}
