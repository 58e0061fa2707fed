use super::{ConnectionManager, ConnectionState, SocketBuilder, SocketOptions, SocketState};
use crate::channel::Channel;
use crate::infrastructure::BackoffTimer;
use crate::messaging::{Event, MessageRouter, Serializer, SystemEvent};
use crate::transport::{Transport, TransportEvent};
use crate::types::constants::{MAX_SEND_BUFFER_SIZE, PHOENIX_TOPIC, VSN, WS_CLOSE_NORMAL};
use crate::types::{Message, RealtimeError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Client end of one multiplexed realtime connection.
///
/// The socket owns the single live transport, the channel registry, the
/// heartbeat, and reconnection. Inbound envelopes are demultiplexed to the
/// channel matching their topic; outbound messages are buffered while
/// disconnected and flushed in order once the connection opens.
///
/// # Example
///
/// ```no_run
/// use phx_realtime::{Socket, SocketOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let socket = Socket::new("ws://localhost:4000/socket/websocket", SocketOptions::default())?;
/// socket.connect().await?;
///
/// let channel = socket.channel("room:1", serde_json::json!({"token": "abc"})).await;
/// channel.join(None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Socket {
    pub(crate) endpoint: String,
    pub(crate) options: Arc<SocketOptions>,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) state: Arc<RwLock<SocketState>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) serializer: Arc<dyn Serializer>,
}

impl Socket {
    /// Create a socket for `endpoint` (`http`/`https` schemes are mapped to
    /// `ws`/`wss`). Use [`SocketBuilder`] to override the transport or the
    /// serializer.
    pub fn new(endpoint: impl Into<String>, options: SocketOptions) -> Result<Self> {
        SocketBuilder::new(endpoint).options(options).build()
    }

    /// Open the transport. A no-op when already open or connecting.
    ///
    /// On success the send buffer is flushed in FIFO order, the heartbeat is
    /// armed, every errored channel rejoins, and `on_open` callbacks fire.
    ///
    /// Boxed because the reconnect loop awaits it from a task spawned by
    /// its own body.
    pub fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.connect_inner())
    }

    async fn connect_inner(&self) -> Result<()> {
        if !self.connection.try_begin_connecting().await {
            return Ok(());
        }

        let url = match self.endpoint_url() {
            Ok(url) => url,
            Err(e) => {
                self.connection.set_state(ConnectionState::Closed).await;
                return Err(e);
            }
        };
        tracing::info!("connecting to {}", self.endpoint);

        let (sink, mut events) = match self.transport.connect(url.as_str(), &self.options.headers).await {
            Ok(pair) => pair,
            Err(e) => {
                self.connection.set_state(ConnectionState::Closed).await;
                return Err(e);
            }
        };
        self.connection.set_sink(sink).await;

        // Read task: the single event-processing loop for this connection.
        let socket = self.clone();
        {
            let mut state = self.state.write().await;
            state.closed_by_user = false;
            state.task_manager.spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        TransportEvent::Message(text) => socket.handle_message(&text).await,
                        TransportEvent::Error(reason) => socket.handle_error(&reason).await,
                        TransportEvent::Closed { code, reason } => {
                            socket.handle_close(code, reason).await;
                            break;
                        }
                    }
                }
            });
        }

        self.spawn_heartbeat().await;
        self.connection.set_state(ConnectionState::Open).await;
        tracing::info!("connection open");

        self.flush_send_buffer().await;
        self.rejoin_channels().await;

        let callbacks = { self.state.read().await.open_callbacks.clone() };
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// Close the connection deliberately. Cancels the heartbeat and any
    /// pending reconnect; no reconnection is attempted afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_with(WS_CLOSE_NORMAL, "").await
    }

    pub async fn disconnect_with(&self, code: u16, reason: &str) -> Result<()> {
        if self.connection.state().await == ConnectionState::Closed {
            return Ok(());
        }
        tracing::info!("disconnecting");

        {
            let mut state = self.state.write().await;
            state.closed_by_user = true;
            state.task_manager.abort_all();
            if let Some(task) = state.heartbeat_task.take() {
                task.abort();
            }
            state.pending_heartbeat_ref = None;
        }

        self.connection.set_state(ConnectionState::Closing).await;
        self.connection
            .close(Some(code), Some(reason.to_string()))
            .await?;
        self.connection.set_state(ConnectionState::Closed).await;

        let callbacks = { self.state.read().await.close_callbacks.clone() };
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// Get a channel bound to `topic`. An existing channel for the topic is
    /// reused only while it is closed; otherwise a new one is registered
    /// alongside it.
    pub async fn channel(&self, topic: impl Into<String>, params: serde_json::Value) -> Arc<Channel> {
        let topic = topic.into();

        let existing: Vec<Arc<Channel>> = {
            let state = self.state.read().await;
            state
                .channels
                .iter()
                .filter(|c| c.topic() == topic)
                .cloned()
                .collect()
        };
        for channel in existing {
            if channel.is_closed().await {
                return channel;
            }
        }

        let channel = Arc::new(Channel::new(topic, params, self.clone()));
        self.state.write().await.channels.push(Arc::clone(&channel));
        channel
    }

    /// Drop a channel from the registry. Later inbound envelopes for its
    /// topic no longer reach it.
    pub async fn remove(&self, channel: &Arc<Channel>) {
        self.state
            .write()
            .await
            .channels
            .retain(|c| !Arc::ptr_eq(c, channel));
    }

    /// Encode and transmit `message`, or buffer it while disconnected.
    pub async fn push(&self, message: Message) -> Result<()> {
        if self.connection.is_connected().await {
            tracing::debug!(
                topic = %message.topic,
                event = %message.event,
                message_ref = ?message.r#ref,
                "pushing message"
            );
            let text = self.serializer.encode(&message)?;
            self.connection.send(text).await
        } else {
            let mut state = self.state.write().await;
            if state.send_buffer.len() >= MAX_SEND_BUFFER_SIZE {
                return Err(RealtimeError::Transport(format!(
                    "send buffer full ({MAX_SEND_BUFFER_SIZE} messages)"
                )));
            }
            tracing::debug!(
                topic = %message.topic,
                event = %message.event,
                "buffering message until connected"
            );
            state.send_buffer.push(message);
            Ok(())
        }
    }

    /// Next unique message reference.
    pub async fn make_ref(&self) -> String {
        self.state.write().await.make_ref()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub async fn on_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state.write().await.open_callbacks.push(Arc::new(callback));
    }

    pub async fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state.write().await.close_callbacks.push(Arc::new(callback));
    }

    pub async fn on_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.state.write().await.error_callbacks.push(Arc::new(callback));
    }

    fn endpoint_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.options.params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("vsn", VSN);
        }
        Ok(url)
    }

    async fn handle_message(&self, raw: &str) {
        let message = match self.serializer.decode(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("failed to decode inbound frame: {e} - raw: {raw}");
                return;
            }
        };
        MessageRouter::new(self.clone()).route(message).await;
    }

    async fn handle_error(&self, reason: &str) {
        tracing::error!("transport error: {reason}");
        let callbacks = { self.state.read().await.error_callbacks.clone() };
        for callback in callbacks {
            callback(reason);
        }
    }

    /// Runs once per connection, when the transport reports it is gone.
    async fn handle_close(&self, code: Option<u16>, reason: Option<String>) {
        tracing::warn!(?code, ?reason, "connection closed");
        self.connection.clear_sink().await;
        self.connection.set_state(ConnectionState::Closed).await;

        let (channels, callbacks, closed_by_user) = {
            let mut state = self.state.write().await;
            state.pending_heartbeat_ref = None;
            if let Some(task) = state.heartbeat_task.take() {
                task.abort();
            }
            (
                state.channels.clone(),
                state.close_callbacks.clone(),
                state.closed_by_user,
            )
        };

        for callback in callbacks {
            callback();
        }

        // Propagate a channel-level error so joins retry after reconnect.
        for channel in &channels {
            channel
                .trigger(
                    Event::System(SystemEvent::Error),
                    serde_json::Value::Null,
                    None,
                )
                .await;
        }

        if closed_by_user {
            return;
        }
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&self) {
        let socket = self.clone();
        let mut timer = self.reconnect_timer();
        self.state.write().await.task_manager.spawn(async move {
            loop {
                timer.schedule_timeout().await;
                {
                    let state = socket.connection.state().await;
                    if state == ConnectionState::Open || state == ConnectionState::Connecting {
                        break;
                    }
                }
                if socket.state.read().await.closed_by_user {
                    break;
                }
                tracing::info!("reconnect attempt {}", timer.attempts());
                match socket.connect().await {
                    Ok(()) => {
                        tracing::info!("reconnected");
                        break;
                    }
                    Err(e) => tracing::error!("reconnect attempt failed: {e}"),
                }
            }
        });
    }

    pub(crate) fn reconnect_timer(&self) -> BackoffTimer {
        match &self.options.reconnect_after {
            Some(after) => BackoffTimer::new(Arc::clone(after)),
            None => BackoffTimer::default(),
        }
    }

    /// One heartbeat loop per connection. The previous loop is aborted here
    /// and in the close path; a leftover loop probing a newer connection
    /// would break the single-pending-heartbeat accounting.
    async fn spawn_heartbeat(&self) {
        let socket = self.clone();
        let interval = Duration::from_millis(self.options.heartbeat_interval);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of `interval` completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !socket.connection.is_connected().await {
                    break;
                }
                socket.send_heartbeat().await;
            }
        });
        let mut state = self.state.write().await;
        if let Some(old) = state.heartbeat_task.replace(task) {
            old.abort();
        }
    }

    /// One probe per interval. An unanswered probe at the next tick means
    /// the connection is dead: force-close it instead of queueing a second
    /// heartbeat, and let the close path drive reconnection.
    async fn send_heartbeat(&self) {
        let stale = { self.state.read().await.pending_heartbeat_ref.is_some() };
        if stale {
            tracing::warn!("heartbeat unanswered, closing connection");
            self.state.write().await.pending_heartbeat_ref = None;
            if let Err(e) = self
                .connection
                .close(Some(WS_CLOSE_NORMAL), Some("heartbeat timeout".to_string()))
                .await
            {
                tracing::error!("failed to close stale connection: {e}");
            }
            return;
        }

        let heartbeat_ref = self.make_ref().await;
        let message = Message::new(
            PHOENIX_TOPIC,
            Event::System(SystemEvent::Heartbeat),
            serde_json::json!({}),
        )
        .with_ref(heartbeat_ref.clone());

        self.state.write().await.pending_heartbeat_ref = Some(heartbeat_ref.clone());
        match self.push(message).await {
            Ok(()) => tracing::debug!("sent heartbeat with ref {heartbeat_ref}"),
            Err(e) => tracing::error!("failed to send heartbeat: {e}"),
        }
    }

    async fn flush_send_buffer(&self) {
        let buffered = {
            let mut state = self.state.write().await;
            std::mem::take(&mut state.send_buffer)
        };
        if buffered.is_empty() {
            return;
        }
        tracing::debug!("flushing {} buffered messages", buffered.len());
        for message in buffered {
            if let Err(e) = self.push(message).await {
                tracing::error!("failed to flush buffered message: {e}");
            }
        }
    }

    async fn rejoin_channels(&self) {
        let channels = { self.state.read().await.channels.clone() };
        for channel in channels {
            channel.rejoin_on_open().await;
        }
    }
}
