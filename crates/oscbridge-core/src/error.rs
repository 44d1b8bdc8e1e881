//! Error types for the OSC codec

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error types
///
/// Decoding never produces these; malformed input degrades to empty or
/// partial results instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A string field contains a zero byte and cannot be zero-terminated
    #[error("invalid string for {field}: contains a zero byte at {position}")]
    InvalidString { field: &'static str, position: usize },

    /// Packet larger than a bundle element size prefix can describe
    #[error("packet too large: {0} bytes")]
    PacketTooLarge(usize),
}
