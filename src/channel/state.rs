use super::push::Push;
use crate::infrastructure::BackoffTimer;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Closed,
    Errored,
    Joined,
    Joining,
    Leaving,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Errored => "errored",
            Self::Joined => "joined",
            Self::Joining => "joining",
            Self::Leaving => "leaving",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked with an event's payload and the message ref, if any.
pub type EventCallback = Arc<dyn Fn(Value, Option<String>) + Send + Sync>;

/// One `on` registration. Multiple bindings per event are independent and
/// fire in registration order.
pub struct EventBinding {
    pub event: String,
    pub binding_ref: u64,
    pub callback: EventCallback,
}

/// Mutable state for a `Channel`.
pub struct ChannelState {
    pub status: ChannelStatus,
    pub bindings: Vec<EventBinding>,
    pub binding_ref: u64,

    /// The distinguished push representing the current join attempt
    pub join_push: Option<Arc<Push>>,

    /// Pushes issued while not yet joined, flushed on join success
    pub push_buffer: Vec<Arc<Push>>,

    /// In-flight pushes awaiting a reply, matched by ref
    pub pending_pushes: Vec<Arc<Push>>,

    /// Whether this channel ever started a join; guards `push` misuse
    pub joined_once: bool,

    pub rejoin_timer: BackoffTimer,
    pub rejoin_task: Option<JoinHandle<()>>,
}

impl ChannelState {
    pub fn new(rejoin_timer: BackoffTimer) -> Self {
        Self {
            status: ChannelStatus::Closed,
            bindings: Vec::new(),
            binding_ref: 0,
            join_push: None,
            push_buffer: Vec::new(),
            pending_pushes: Vec::new(),
            joined_once: false,
            rejoin_timer,
            rejoin_task: None,
        }
    }
}
