//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("failed to bind {role} socket: {source}")]
    Bind {
        role: &'static str,
        #[source]
        source: oscbridge_transport::TransportError,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid outbound target: {0}")]
    InvalidTarget(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] oscbridge_transport::TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] oscbridge_core::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bridge task failed: {0}")]
    Task(String),
}

impl RouterError {
    /// Wrap a transport error raised while binding `role`
    pub fn bind(role: &'static str) -> impl FnOnce(oscbridge_transport::TransportError) -> Self {
        move |source| RouterError::Bind { role, source }
    }
}
