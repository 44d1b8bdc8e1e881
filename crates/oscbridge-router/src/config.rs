//! Bridge configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```toml
//! liveness_interval_secs = 15
//!
//! [osc]
//! port = 9100
//!
//! [outbound]
//! host = "192.168.1.20"
//! ```

use oscbridge_core::{DEFAULT_OSC_PORT, DEFAULT_OUTBOUND_PORT, DEFAULT_WS_PORT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, RouterError};
use crate::outbound::OutboundTarget;

/// Inbound OSC socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscConfig {
    /// Interface to bind
    #[serde(default = "default_bind")]
    pub bind: String,
    /// UDP port to listen on
    #[serde(default = "default_osc_port")]
    pub port: u16,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_OSC_PORT,
        }
    }
}

/// Outbound OSC socket and destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Local address of the sending socket
    #[serde(default = "default_outbound_bind")]
    pub bind: String,
    /// Destination host
    #[serde(default = "default_outbound_host")]
    pub host: String,
    /// Destination port
    #[serde(default = "default_outbound_port")]
    pub port: u16,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            bind: default_outbound_bind(),
            host: default_outbound_host(),
            port: DEFAULT_OUTBOUND_PORT,
        }
    }
}

/// WebSocket server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketServerConfig {
    /// Interface to bind
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TCP port to listen on
    #[serde(default = "default_ws_port")]
    pub port: u16,
    /// Largest accepted client message
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Frames queued per client before it counts as failed
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for WebSocketServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_WS_PORT,
            max_message_size: default_max_message_size(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub websocket: WebSocketServerConfig,
    /// Seconds between liveness sweeps
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,
    /// Hard limit on graceful shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_osc_port() -> u16 {
    DEFAULT_OSC_PORT
}

fn default_outbound_bind() -> String {
    "0.0.0.0:0".to_string()
}

fn default_outbound_host() -> String {
    "127.0.0.1".to_string()
}

fn default_outbound_port() -> u16 {
    DEFAULT_OUTBOUND_PORT
}

fn default_ws_port() -> u16 {
    DEFAULT_WS_PORT
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_liveness_interval() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    500
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            osc: OscConfig::default(),
            outbound: OutboundConfig::default(),
            websocket: WebSocketServerConfig::default(),
            liveness_interval_secs: default_liveness_interval(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl BridgeConfig {
    /// Config bound to loopback on ephemeral ports
    pub fn local_ephemeral() -> Self {
        Self {
            osc: OscConfig {
                bind: "127.0.0.1".to_string(),
                port: 0,
            },
            outbound: OutboundConfig {
                bind: "127.0.0.1:0".to_string(),
                ..OutboundConfig::default()
            },
            websocket: WebSocketServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 0,
                ..WebSocketServerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn osc_addr(&self) -> String {
        format!("{}:{}", self.osc.bind, self.osc.port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.websocket.bind, self.websocket.port)
    }

    pub fn outbound_target(&self) -> OutboundTarget {
        OutboundTarget::new(self.outbound.host.clone(), self.outbound.port)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.liveness_interval_secs == 0 {
            return Err(RouterError::Config(
                "liveness_interval_secs must be at least 1".into(),
            ));
        }
        if self.websocket.send_queue_capacity == 0 {
            return Err(RouterError::Config(
                "websocket.send_queue_capacity must be at least 1".into(),
            ));
        }
        if self.outbound.host.is_empty() {
            return Err(RouterError::Config("outbound.host is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.osc_addr(), "0.0.0.0:9000");
        assert_eq!(config.ws_addr(), "0.0.0.0:8080");
        assert_eq!(config.outbound_target().to_string(), "127.0.0.1:9001");
        assert_eq!(config.liveness_interval(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"osc": {"port": 9100}, "liveness_interval_secs": 5}"#)
                .unwrap();
        assert_eq!(config.osc.port, 9100);
        assert_eq!(config.osc.bind, "0.0.0.0");
        assert_eq!(config.websocket.port, 8080);
        assert_eq!(config.liveness_interval_secs, 5);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = BridgeConfig {
            liveness_interval_secs: 0,
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(RouterError::Config(_))));
    }
}
