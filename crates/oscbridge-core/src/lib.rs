//! oscbridge core
//!
//! OSC (Open Sound Control) wire codec and message types shared by the
//! bridge crates.
//!
//! This crate provides:
//! - The decoded message model ([`Message`], [`Argument`])
//! - Message and bundle decoding that never fails on malformed input
//!   ([`codec::decode_message`], [`codec::decode_bundle`])
//! - Message and bundle encoding ([`codec::encode_message`],
//!   [`codec::encode_bundle`])

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_bundle, decode_message, encode_bundle, encode_message};
pub use error::{Error, Result};
pub use types::*;

/// Default UDP port for inbound OSC
pub const DEFAULT_OSC_PORT: u16 = 9000;

/// Default UDP port outbound OSC is sent to
pub const DEFAULT_OUTBOUND_PORT: u16 = 9001;

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 8080;

/// OSC bundle marker, including its terminating zero
pub const BUNDLE_MARKER: &[u8; 8] = b"#bundle\0";
