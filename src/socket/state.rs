use crate::channel::Channel;
use crate::infrastructure::TaskManager;
use crate::types::Message;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub type SocketCallback = Arc<dyn Fn() + Send + Sync>;
pub type SocketErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Consolidated mutable state for a `Socket`.
/// A single struct keeps lock acquisition to one point.
pub struct SocketState {
    /// Source of globally unique message references
    pub ref_counter: u64,

    /// Ref of the heartbeat awaiting acknowledgement, if any
    pub pending_heartbeat_ref: Option<String>,

    /// Registered channels, in registration order; topics may repeat
    pub channels: Vec<Arc<Channel>>,

    /// Messages queued while disconnected, flushed FIFO on open
    pub send_buffer: Vec<Message>,

    /// Background task tracking
    pub task_manager: TaskManager,

    /// The one live heartbeat loop; replaced on connect, aborted on close
    pub heartbeat_task: Option<JoinHandle<()>>,

    /// Set by `disconnect()` before teardown; suppresses reconnection
    pub closed_by_user: bool,

    pub open_callbacks: Vec<SocketCallback>,
    pub close_callbacks: Vec<SocketCallback>,
    pub error_callbacks: Vec<SocketErrorCallback>,
}

impl SocketState {
    pub fn new() -> Self {
        Self {
            ref_counter: 0,
            pending_heartbeat_ref: None,
            channels: Vec::new(),
            send_buffer: Vec::new(),
            task_manager: TaskManager::new(),
            heartbeat_task: None,
            closed_by_user: false,
            open_callbacks: Vec::new(),
            close_callbacks: Vec::new(),
            error_callbacks: Vec::new(),
        }
    }

    /// Next message reference. Wraps to `"0"` on overflow rather than
    /// growing unbounded.
    pub fn make_ref(&mut self) -> String {
        self.ref_counter = self.ref_counter.checked_add(1).unwrap_or(0);
        self.ref_counter.to_string()
    }
}

impl Default for SocketState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_strictly_increasing() {
        let mut state = SocketState::new();
        let refs: Vec<String> = (0..5).map(|_| state.make_ref()).collect();
        assert_eq!(refs, ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn ref_counter_wraps_to_zero_on_overflow() {
        let mut state = SocketState::new();
        state.ref_counter = u64::MAX - 1;
        assert_eq!(state.make_ref(), u64::MAX.to_string());
        assert_eq!(state.make_ref(), "0");
        assert_eq!(state.make_ref(), "1");
    }
}
