use super::push::Push;
use super::state::{ChannelState, ChannelStatus, EventBinding, EventCallback};
use crate::messaging::{reply_event_name, Event, SystemEvent};
use crate::socket::Socket;
use crate::types::constants::phoenix_events;
use crate::types::{RealtimeError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One logical topic subscription multiplexed over the socket.
///
/// A channel owns its join/leave state machine and the pushes in flight on
/// its topic. It survives reconnection by rejoining automatically with a
/// fresh ref.
///
/// # Example
///
/// ```no_run
/// use phx_realtime::{Socket, SocketOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let socket = Socket::new("ws://localhost:4000/socket", SocketOptions::default())?;
/// # socket.connect().await?;
/// let channel = socket.channel("room:1", serde_json::json!({"token": "abc"})).await;
///
/// channel.on("new_msg", |payload, _ref| {
///     println!("new_msg: {payload}");
/// }).await;
///
/// let join = channel.join(None).await?;
/// join.receive("ok", |_| println!("joined"))
///     .receive("error", |resp| eprintln!("join rejected: {resp}"));
/// # Ok(())
/// # }
/// ```
pub struct Channel {
    topic: String,
    params: Value,
    socket: Socket,
    default_timeout: Duration,
    pub(crate) state: Arc<RwLock<ChannelState>>,
}

impl Channel {
    pub(crate) fn new(topic: String, params: Value, socket: Socket) -> Self {
        let default_timeout = Duration::from_millis(socket.options().timeout);
        // Join retry shares the socket's reconnect backoff policy.
        let rejoin_timer = socket.reconnect_timer();
        Self {
            topic,
            params,
            socket,
            default_timeout,
            state: Arc::new(RwLock::new(ChannelState::new(rejoin_timer))),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn status(&self) -> ChannelStatus {
        self.state.read().await.status
    }

    pub async fn is_joined(&self) -> bool {
        self.status().await == ChannelStatus::Joined
    }

    pub async fn is_closed(&self) -> bool {
        self.status().await == ChannelStatus::Closed
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Ref of the current join attempt; carried as `join_ref` on every push.
    pub(crate) async fn join_ref(&self) -> Option<String> {
        let state = self.state.read().await;
        state.join_push.as_ref().and_then(|push| push.ref_id())
    }

    /// Start the join handshake. Legal once per channel instance; the
    /// underlying join push retries on its own after timeouts and
    /// reconnects.
    pub async fn join(self: &Arc<Self>, timeout: Option<Duration>) -> Result<Arc<Push>> {
        {
            let state = self.state.read().await;
            if state.joined_once {
                return Err(RealtimeError::Channel(format!(
                    "tried to join `{}` multiple times; `join` can only be called once per channel",
                    self.topic
                )));
            }
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let push = Push::new(
            Arc::clone(self),
            phoenix_events::JOIN,
            self.params.clone(),
            timeout,
        );

        let channel = Arc::clone(self);
        push.receive("ok", move |_response| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.handle_join_ok().await });
        });
        let channel = Arc::clone(self);
        push.receive("error", move |response| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.handle_join_error(response).await });
        });
        let channel = Arc::clone(self);
        push.receive("timeout", move |_response| {
            tracing::warn!("join of `{}` timed out", channel.topic);
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.rejoin_until_connected().await });
        });

        {
            let mut state = self.state.write().await;
            state.joined_once = true;
            state.join_push = Some(Arc::clone(&push));
        }
        self.send_join(timeout).await;
        Ok(push)
    }

    /// Push `event` to the server. Errors if `join` was never called;
    /// buffered until the channel is joined otherwise.
    pub async fn push(self: &Arc<Self>, event: impl Into<String>, payload: Value) -> Result<Arc<Push>> {
        self.push_with_timeout(event, payload, self.default_timeout).await
    }

    pub async fn push_with_timeout(
        self: &Arc<Self>,
        event: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Result<Arc<Push>> {
        let event = event.into();
        {
            let state = self.state.read().await;
            if !state.joined_once {
                return Err(RealtimeError::Channel(format!(
                    "tried to push `{event}` to `{}` before joining; call `join` first",
                    self.topic
                )));
            }
        }

        let push = Push::new(Arc::clone(self), event, payload, timeout);
        if self.can_push().await {
            push.send().await;
        } else {
            push.start_timeout().await;
            self.state.write().await.push_buffer.push(Arc::clone(&push));
        }
        Ok(push)
    }

    /// Leave the topic. The channel closes on the server's `ok` or on
    /// timeout, whichever comes first; when it cannot push, it closes
    /// immediately with a local `ok`.
    pub async fn leave(self: &Arc<Self>, timeout: Option<Duration>) -> Arc<Push> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let can_push = self.can_push().await;
        {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Leaving;
            if let Some(task) = state.rejoin_task.take() {
                task.abort();
            }
        }
        tracing::info!("leaving `{}`", self.topic);

        let push = Push::new(
            Arc::clone(self),
            phoenix_events::LEAVE,
            serde_json::json!({}),
            timeout,
        );
        let channel = Arc::clone(self);
        let on_done = move |_response: Value| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.handle_close("left").await });
        };
        let push = push.receive("ok", on_done.clone()).receive("timeout", on_done);

        push.send().await;
        if !can_push {
            // No server ack can arrive; honor the leave intent locally.
            push.trigger("ok", serde_json::json!({}));
        }
        push
    }

    /// Register `callback` for `event`. Returns a binding ref usable with
    /// [`off_ref`](Self::off_ref).
    pub async fn on(
        &self,
        event: impl Into<String>,
        callback: impl Fn(Value, Option<String>) + Send + Sync + 'static,
    ) -> u64 {
        let mut state = self.state.write().await;
        state.binding_ref += 1;
        let binding_ref = state.binding_ref;
        state.bindings.push(EventBinding {
            event: event.into(),
            binding_ref,
            callback: Arc::new(callback),
        });
        binding_ref
    }

    /// Remove every binding for `event`.
    pub async fn off(&self, event: &str) {
        self.state
            .write()
            .await
            .bindings
            .retain(|binding| binding.event != event);
    }

    /// Remove one binding for `event` by its ref.
    pub async fn off_ref(&self, event: &str, binding_ref: u64) {
        self.state.write().await.bindings.retain(|binding| {
            binding.event != event || binding.binding_ref != binding_ref
        });
    }

    /// Shorthand for binding the local close event.
    pub async fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) -> u64 {
        self.on(phoenix_events::CLOSE, move |_, _| callback()).await
    }

    /// Shorthand for binding the channel error event.
    pub async fn on_error(&self, callback: impl Fn(Value) + Send + Sync + 'static) -> u64 {
        self.on(phoenix_events::ERROR, move |payload, _| callback(payload))
            .await
    }

    /// Dispatch point for inbound envelopes whose topic matched.
    pub(crate) async fn trigger(self: &Arc<Self>, event: Event, payload: Value, reference: Option<String>) {
        match event {
            Event::System(SystemEvent::Reply) => {
                match reference {
                    Some(reference) => self.trigger_reply(&reference, payload).await,
                    None => tracing::debug!("dropping reply without ref on `{}`", self.topic),
                }
                return;
            }
            Event::System(SystemEvent::Close) => {
                self.handle_close("server closed the channel").await;
                return;
            }
            Event::System(SystemEvent::Error) => {
                self.handle_channel_error().await;
                // fall through so `phx_error` bindings observe it
            }
            _ => {}
        }

        let callbacks: Vec<EventCallback> = {
            let state = self.state.read().await;
            state
                .bindings
                .iter()
                .filter(|binding| binding.event == event.as_str())
                .map(|binding| Arc::clone(&binding.callback))
                .collect()
        };
        for callback in callbacks {
            callback(payload.clone(), reference.clone());
        }
    }

    /// Route a reply to the push awaiting its ref; the push is removed from
    /// the pending set exactly once, so later replies for the same ref fall
    /// through and are dropped.
    async fn trigger_reply(&self, reference: &str, payload: Value) {
        let ref_event = reply_event_name(reference);
        let push = {
            let mut state = self.state.write().await;
            state
                .pending_pushes
                .iter()
                .position(|push| push.ref_event_matches(&ref_event))
                .map(|index| state.pending_pushes.remove(index))
        };
        let Some(push) = push else {
            tracing::debug!("dropping reply for unknown ref {reference} on `{}`", self.topic);
            return;
        };
        let (status, response) = split_reply(payload);
        tracing::debug!(
            "reply for ref {reference} on `{}` with status {status}",
            self.topic
        );
        push.trigger(&status, response);
    }

    pub(crate) async fn register_push(&self, push: &Arc<Push>) {
        let mut state = self.state.write().await;
        if !state.pending_pushes.iter().any(|p| Arc::ptr_eq(p, push)) {
            state.pending_pushes.push(Arc::clone(push));
        }
    }

    pub(crate) async fn unregister_push(&self, push: &Arc<Push>) {
        self.state
            .write()
            .await
            .pending_pushes
            .retain(|p| !Arc::ptr_eq(p, push));
    }

    /// Called when the socket reopens. Errored and previously joined
    /// channels rejoin; channels already joining have their join push
    /// sitting in the send buffer, and leaving/closed channels stay put.
    pub(crate) async fn rejoin_on_open(self: &Arc<Self>) {
        let status = self.status().await;
        if matches!(status, ChannelStatus::Errored | ChannelStatus::Joined) {
            tracing::info!("rejoining `{}` after reconnect", self.topic);
            {
                // The fresh attempt supersedes any retry armed before the
                // connection dropped.
                let mut state = self.state.write().await;
                if let Some(task) = state.rejoin_task.take() {
                    task.abort();
                }
                state.rejoin_timer.reset();
            }
            self.rejoin(None).await;
        } else {
            tracing::debug!("not rejoining `{}` ({status})", self.topic);
        }
    }

    async fn can_push(&self) -> bool {
        self.socket.is_connected().await && self.is_joined().await
    }

    async fn send_join(self: &Arc<Self>, timeout: Duration) {
        {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Joining;
        }
        let push = { self.state.read().await.join_push.clone() };
        if let Some(push) = push {
            push.resend(timeout).await;
        }
    }

    /// Issue a new join attempt with a fresh ref. There is never more than
    /// one live join push: the previous attempt is reset before resending.
    async fn rejoin(self: &Arc<Self>, timeout: Option<Duration>) {
        {
            let state = self.state.read().await;
            if matches!(state.status, ChannelStatus::Leaving | ChannelStatus::Closed) {
                return;
            }
        }
        let timeout = match timeout {
            Some(timeout) => timeout,
            None => {
                let state = self.state.read().await;
                state
                    .join_push
                    .as_ref()
                    .map(|push| push.timeout())
                    .unwrap_or(self.default_timeout)
            }
        };
        self.send_join(timeout).await;
    }

    /// Arm a single retry task: it waits out the backoff, rejoins once the
    /// socket is connected, and keeps waiting (with growing delays) while
    /// it is not.
    async fn rejoin_until_connected(self: &Arc<Self>) {
        let first_delay = {
            let mut state = self.state.write().await;
            if let Some(task) = state.rejoin_task.take() {
                task.abort();
            }
            state.rejoin_timer.next_delay()
        };

        let channel = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::time::sleep(delay).await;
                if channel.socket.is_connected().await {
                    channel.rejoin(None).await;
                    return;
                }
                delay = channel.state.write().await.rejoin_timer.next_delay();
            }
        });
        self.state.write().await.rejoin_task = Some(task);
    }

    async fn handle_join_ok(self: &Arc<Self>) {
        tracing::info!("joined `{}`", self.topic);
        let buffered = {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Joined;
            state.rejoin_timer.reset();
            if let Some(task) = state.rejoin_task.take() {
                task.abort();
            }
            std::mem::take(&mut state.push_buffer)
        };
        // Flush in original call order.
        for push in buffered {
            push.send().await;
        }
    }

    async fn handle_join_error(self: &Arc<Self>, response: Value) {
        tracing::warn!("join of `{}` rejected: {response}", self.topic);
        self.state.write().await.status = ChannelStatus::Errored;
    }

    /// Channel-level error: from the server (`phx_error`) or propagated by
    /// the socket when the connection drops.
    async fn handle_channel_error(self: &Arc<Self>) {
        let status = self.status().await;
        match status {
            ChannelStatus::Closed => {}
            // The leave can no longer be acked; honor it locally.
            ChannelStatus::Leaving => self.handle_close("connection dropped while leaving").await,
            _ => {
                tracing::warn!("channel `{}` errored", self.topic);
                self.state.write().await.status = ChannelStatus::Errored;
            }
        }
    }

    async fn handle_close(self: &Arc<Self>, reason: &str) {
        tracing::debug!("closing `{}` ({reason})", self.topic);
        let callbacks: Vec<EventCallback> = {
            let mut state = self.state.write().await;
            state.status = ChannelStatus::Closed;
            if let Some(task) = state.rejoin_task.take() {
                task.abort();
            }
            if let Some(push) = &state.join_push {
                push.abort_timeout();
            }
            for push in &state.pending_pushes {
                push.abort_timeout();
            }
            state.pending_pushes.clear();
            state
                .bindings
                .iter()
                .filter(|binding| binding.event == phoenix_events::CLOSE)
                .map(|binding| Arc::clone(&binding.callback))
                .collect()
        };
        for callback in callbacks {
            callback(serde_json::json!({}), None);
        }
        let this = Arc::clone(self);
        self.socket.remove(&this).await;
    }
}

/// Reply payloads carry `{status, response}`.
fn split_reply(payload: Value) -> (String, Value) {
    let status = payload
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("error")
        .to_string();
    let response = payload.get("response").cloned().unwrap_or(Value::Null);
    (status, response)
}
