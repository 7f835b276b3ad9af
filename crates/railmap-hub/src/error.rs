use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("Negotiation failed: {0}")]
    Negotiate(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Hub method {method} failed: {message}")]
    Invocation { method: String, message: String },

    #[error("Connection lost before the call completed")]
    ConnectionLost,

    #[error("Hub client has shut down")]
    Closed,

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
