use crate::transport::TransportSink;
use crate::types::{RealtimeError, Result};
use tokio::sync::{Mutex, RwLock};

/// Transport readiness, queryable by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the write half of the single live transport.
pub struct ConnectionManager {
    sink: Mutex<Option<Box<dyn TransportSink>>>,
    state: RwLock<ConnectionState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            state: RwLock::new(ConnectionState::Closed),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Open
    }

    /// Atomically claim the `Connecting` state. Returns false when a
    /// connection is already live or being dialed, so two concurrent
    /// `connect` calls cannot open two transports.
    pub async fn try_begin_connecting(&self) -> bool {
        let mut state = self.state.write().await;
        match *state {
            ConnectionState::Open | ConnectionState::Connecting => {
                tracing::debug!("connect ignored while {}", *state);
                false
            }
            _ => {
                *state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// Install the write half of a freshly opened connection.
    pub async fn set_sink(&self, sink: Box<dyn TransportSink>) {
        *self.sink.lock().await = Some(sink);
    }

    pub async fn clear_sink(&self) {
        *self.sink.lock().await = None;
    }

    /// Transmit one encoded frame.
    pub async fn send(&self, text: String) -> Result<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send(text).await,
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Close the transport if one is present. The resulting `Closed` event
    /// (if anyone is still reading it) reports the given code and reason.
    pub async fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            sink.close(code, reason).await?;
        }
        *guard = None;
        Ok(())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
