use super::{ConnectionManager, Socket, SocketState};
use crate::infrastructure::DelayFn;
use crate::messaging::{JsonSerializer, Serializer};
use crate::transport::{Transport, WebSocketTransport};
use crate::types::constants::{DEFAULT_TIMEOUT, HEARTBEAT_INTERVAL, LONGPOLLER_TIMEOUT};
use crate::types::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// Recognized socket configuration.
#[derive(Clone)]
pub struct SocketOptions {
    /// Default push timeout in milliseconds
    pub timeout: u64,
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
    /// Recognized for longpoll transports; unused by the WebSocket transport
    pub longpoller_timeout: u64,
    /// Attempt-count to delay function for reconnection and rejoin.
    /// `None` uses the stepped backoff table.
    pub reconnect_after: Option<DelayFn>,
    /// Query parameters appended to the connection URL
    pub params: Vec<(String, String)>,
    /// Extra headers for the transport handshake
    pub headers: Vec<(String, String)>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            longpoller_timeout: LONGPOLLER_TIMEOUT,
            reconnect_after: None,
            params: Vec::new(),
            headers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SocketOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketOptions")
            .field("timeout", &self.timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("longpoller_timeout", &self.longpoller_timeout)
            .field("reconnect_after", &self.reconnect_after.as_ref().map(|_| "<fn>"))
            .field("params", &self.params)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Builder for [`Socket`], with override points for the transport and the
/// wire serializer.
pub struct SocketBuilder {
    endpoint: String,
    options: SocketOptions,
    transport: Option<Arc<dyn Transport>>,
    serializer: Option<Arc<dyn Serializer>>,
}

impl SocketBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            options: SocketOptions::default(),
            transport: None,
            serializer: None,
        }
    }

    pub fn options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn build(self) -> Result<Socket> {
        let endpoint = normalize_scheme(&self.endpoint);
        Url::parse(&endpoint)?;

        Ok(Socket {
            endpoint,
            options: Arc::new(self.options),
            connection: Arc::new(ConnectionManager::new()),
            state: Arc::new(RwLock::new(SocketState::new())),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(WebSocketTransport)),
            serializer: self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer)),
        })
    }
}

/// `http`/`https` endpoints are accepted and mapped onto `ws`/`wss`.
fn normalize_scheme(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}
