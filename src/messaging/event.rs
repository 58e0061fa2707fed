use crate::types::constants::{phoenix_events, REPLY_EVENT_PREFIX};
use serde::de::Deserializer;
use serde::ser::Serializer as SerdeSerializer;
use serde::{Deserialize, Serialize};

/// Type-safe channel events.
///
/// Reserved protocol events get their own variants; everything else,
/// including `chan_reply_<ref>` reply events, travels as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    /// Protocol events (`phx_*` and the heartbeat)
    System(SystemEvent),
    /// User-defined event
    Custom(String),
}

impl Event {
    pub fn parse(s: &str) -> Self {
        match s {
            phoenix_events::JOIN => Self::System(SystemEvent::Join),
            phoenix_events::LEAVE => Self::System(SystemEvent::Leave),
            phoenix_events::REPLY => Self::System(SystemEvent::Reply),
            phoenix_events::CLOSE => Self::System(SystemEvent::Close),
            phoenix_events::ERROR => Self::System(SystemEvent::Error),
            phoenix_events::HEARTBEAT => Self::System(SystemEvent::Heartbeat),
            _ => Self::Custom(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::System(sys) => sys.as_str(),
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for Event {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Event {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Events serialize as their plain string form on the wire.
impl Serialize for Event {
    fn serialize<S: SerdeSerializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Event::parse(&s))
    }
}

/// Phoenix system events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    Join,
    Leave,
    Reply,
    Close,
    Error,
    Heartbeat,
}

impl SystemEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => phoenix_events::JOIN,
            Self::Leave => phoenix_events::LEAVE,
            Self::Reply => phoenix_events::REPLY,
            Self::Close => phoenix_events::CLOSE,
            Self::Error => phoenix_events::ERROR,
            Self::Heartbeat => phoenix_events::HEARTBEAT,
        }
    }
}

/// Event name that routes a reply to its originating push.
pub fn reply_event_name(reference: &str) -> String {
    format!("{REPLY_EVENT_PREFIX}{reference}")
}
