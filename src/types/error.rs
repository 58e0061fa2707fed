use thiserror::Error;

/// Errors surfaced by the realtime client.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Transport-level fault with a descriptive message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Channel misuse (push before join, double join, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Wire envelope could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed endpoint URL
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,
}

/// Convenience alias for `Result<T, RealtimeError>`.
pub type Result<T> = std::result::Result<T, RealtimeError>;
