use super::{Event, SystemEvent};
use crate::channel::Channel;
use crate::socket::Socket;
use crate::types::constants::PHOENIX_TOPIC;
use crate::types::Message;
use std::sync::Arc;

/// Demultiplexes inbound envelopes to the channels registered for their
/// topic.
pub struct MessageRouter {
    socket: Socket,
}

impl MessageRouter {
    pub fn new(socket: Socket) -> Self {
        Self { socket }
    }

    pub async fn route(&self, message: Message) {
        tracing::debug!(
            topic = %message.topic,
            event = %message.event,
            message_ref = ?message.r#ref,
            "routing message"
        );

        if message.topic == PHOENIX_TOPIC {
            self.handle_heartbeat_ack(&message).await;
            return;
        }

        let channels: Vec<Arc<Channel>> = {
            let state = self.socket.state.read().await;
            state
                .channels
                .iter()
                .filter(|channel| channel.topic() == message.topic)
                .cloned()
                .collect()
        };
        if channels.is_empty() {
            tracing::debug!("no channel registered for topic `{}`", message.topic);
            return;
        }

        for channel in channels {
            // A join_ref from a previous channel generation means the
            // message belongs to a subscription that no longer exists.
            if let (Some(message_join_ref), Some(join_ref)) =
                (&message.join_ref, channel.join_ref().await)
            {
                if *message_join_ref != join_ref {
                    tracing::debug!(
                        "dropping stale `{}` on `{}` (join_ref {message_join_ref} != {join_ref})",
                        message.event,
                        message.topic
                    );
                    continue;
                }
            }
            channel
                .trigger(
                    message.event.clone(),
                    message.payload.clone(),
                    message.r#ref.clone(),
                )
                .await;
        }
    }

    /// A reply on the reserved topic answers the outstanding heartbeat
    /// probe. Anything else there is ignored.
    async fn handle_heartbeat_ack(&self, message: &Message) {
        if message.event != Event::System(SystemEvent::Reply) {
            return;
        }
        let mut state = self.socket.state.write().await;
        if state.pending_heartbeat_ref.is_some()
            && state.pending_heartbeat_ref == message.r#ref
        {
            tracing::debug!("heartbeat acknowledged");
            state.pending_heartbeat_ref = None;
        }
    }
}
