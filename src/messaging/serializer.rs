use crate::types::{Message, Result};

/// Pluggable wire encoding for the envelope.
///
/// The socket owns one serializer and runs every outbound message through
/// `encode` and every inbound frame through `decode`. Swap it out via
/// [`SocketBuilder::serializer`](crate::socket::SocketBuilder::serializer)
/// for binary or versioned encodings.
pub trait Serializer: Send + Sync {
    fn encode(&self, message: &Message) -> Result<String>;
    fn decode(&self, raw: &str) -> Result<Message>;
}

/// Default serializer: one JSON object per frame,
/// `{topic, event, payload, ref, join_ref}`.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, message: &Message) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }

    fn decode(&self, raw: &str) -> Result<Message> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{Event, SystemEvent};

    #[test]
    fn json_serializer_round_trips_an_envelope() {
        let serializer: Box<dyn Serializer> = Box::new(JsonSerializer);
        let message = Message::new(
            "room:1",
            Event::System(SystemEvent::Join),
            serde_json::json!({"token": "abc"}),
        )
        .with_ref("1".to_string())
        .with_join_ref("1".to_string());

        let encoded = serializer.encode(&message).unwrap();
        let decoded = serializer.decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        assert!(JsonSerializer.decode("not json").is_err());
    }
}
