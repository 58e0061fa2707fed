use crate::messaging::Event;
use serde::{Deserialize, Serialize};

/// Wire envelope exchanged with the server.
///
/// `ref` correlates an asynchronous reply with its originating push;
/// `join_ref` ties a message to the join that established its channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub topic: String,
    pub event: Event,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Message {
    pub fn new(topic: impl Into<String>, event: Event, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            event,
            payload,
            r#ref: None,
            join_ref: None,
        }
    }

    pub fn with_ref(mut self, r#ref: String) -> Self {
        self.r#ref = Some(r#ref);
        self
    }

    pub fn with_join_ref(mut self, join_ref: String) -> Self {
        self.join_ref = Some(join_ref);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::SystemEvent;

    #[test]
    fn serializes_without_absent_refs() {
        let message = Message::new(
            "room:1",
            Event::Custom("new_msg".to_string()),
            serde_json::Value::Null,
        );

        let json = serde_json::to_string(&message).unwrap();
        assert!(!json.contains(r#""ref":"#));
        assert!(!json.contains(r#""join_ref":"#));
    }

    #[test]
    fn round_trips_with_refs() {
        let message = Message::new(
            "room:1",
            Event::System(SystemEvent::Join),
            serde_json::json!({"token": "abc"}),
        )
        .with_ref("7".to_string())
        .with_join_ref("7".to_string());

        let serialized = serde_json::to_string(&message).unwrap();
        assert!(serialized.contains(r#""event":"phx_join""#));

        let deserialized: Message = serde_json::from_str(&serialized).unwrap();
        assert_eq!(message, deserialized);
    }
}
