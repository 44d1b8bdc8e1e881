//! oscbridge router
//!
//! The routing half of the bridge:
//! - Tracks live WebSocket clients and their liveness ([`ClientRegistry`])
//! - Broadcasts decoded OSC messages to every client ([`InboundListener`])
//! - Forwards client analysis events as OSC over UDP ([`StreamServer`], [`OscSender`])
//! - Runs the pieces together with cooperative shutdown ([`Bridge`])
//!
//! # Example
//!
//! ```no_run
//! use oscbridge_router::{Bridge, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut bridge = Bridge::start(BridgeConfig::default()).await?;
//!
//!     tokio::select! {
//!         result = bridge.wait() => result?,
//!         _ = tokio::signal::ctrl_c() => {}
//!     }
//!
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod registry;
pub mod stream;

pub use bridge::Bridge;
pub use client::{ClientConnection, ClientId, ClientState, ClientStatus, Liveness};
pub use config::{BridgeConfig, OscConfig, OutboundConfig, WebSocketServerConfig};
pub use error::{Result, RouterError};
pub use inbound::InboundListener;
pub use outbound::{OscSender, OutboundTarget};
pub use registry::{ClientRegistry, SweepReport};
pub use stream::{AnalysisEvent, ClientPayload, StreamServer};
