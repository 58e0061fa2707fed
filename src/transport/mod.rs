mod websocket;

pub use websocket::WebSocketTransport;

use crate::types::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events surfaced by a transport's read side.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete inbound text frame.
    Message(String),
    /// A transport-level fault. Does not by itself mean the connection
    /// closed; a `Closed` event follows if it did.
    Error(String),
    /// The connection is gone. Always the final event for a connection.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Write half of an established connection.
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the connection. Must surface a `Closed` event on the paired
    /// receiver once the connection is actually gone.
    async fn close(&mut self, code: Option<u16>, reason: Option<String>) -> Result<()>;
}

/// Connection factory consumed by the socket. The default is
/// [`WebSocketTransport`]; tests substitute an in-process implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(Box<dyn TransportSink>, mpsc::Receiver<TransportEvent>)>;
}
