//! Error types for the chat session layer.

use thiserror::Error;

use threadline_gateway::GatewayError;

/// Errors surfaced by the public chat contract.
///
/// The variants are coarse on purpose: HTTP adapters key status codes off
/// them (503 for `NotReady`, 404 for `SessionNotFound`, 500 for
/// `GatewayUnavailable`).
#[derive(Debug, Error)]
pub enum ChatError {
    /// The gateway connection has not completed its handshake yet.
    #[error("gateway connection is not ready")]
    NotReady,

    /// The client-supplied session id has no live thread behind it.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The gateway is misconfigured, unreachable, or timed out.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl From<GatewayError> for ChatError {
    fn from(err: GatewayError) -> Self {
        ChatError::GatewayUnavailable(err.to_string())
    }
}

/// Convenience alias for chat-layer results.
pub type ChatResult<T> = Result<T, ChatError>;
