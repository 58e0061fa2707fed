use super::core::Channel;
use crate::messaging::{reply_event_name, Event};
use crate::types::Message;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type PushCallback = Arc<dyn Fn(Value) + Send + Sync>;

struct PushState {
    ref_id: Option<String>,
    ref_event: Option<String>,
    /// First `{status, response}` observed for this ref; terminal once set
    received_resp: Option<(String, Value)>,
    /// Status-keyed callbacks, in registration order
    rec_hooks: Vec<(String, PushCallback)>,
    sent: bool,
    timeout: Duration,
    timeout_task: Option<JoinHandle<()>>,
}

/// One outbound request on one channel, correlated to its reply by ref.
///
/// A push resolves to exactly one terminal status — `ok`, `error`, or a
/// locally synthesized `timeout` — unless it is explicitly resent, which
/// assigns it a fresh ref.
pub struct Push {
    channel: Arc<Channel>,
    event: String,
    payload: Value,
    state: Mutex<PushState>,
}

impl Push {
    pub(crate) fn new(
        channel: Arc<Channel>,
        event: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            event: event.into(),
            payload,
            state: Mutex::new(PushState {
                ref_id: None,
                ref_event: None,
                received_resp: None,
                rec_hooks: Vec::new(),
                sent: false,
                timeout,
                timeout_task: None,
            }),
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn ref_id(&self) -> Option<String> {
        self.state.lock().unwrap().ref_id.clone()
    }

    pub fn is_sent(&self) -> bool {
        self.state.lock().unwrap().sent
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.state.lock().unwrap().timeout
    }

    pub fn has_received(&self, status: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .received_resp
            .as_ref()
            .is_some_and(|(s, _)| s == status)
    }

    pub(crate) fn ref_event_matches(&self, ref_event: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .ref_event
            .as_deref()
            .is_some_and(|e| e == ref_event)
    }

    /// Register `callback` for `status`. If a response with that status has
    /// already arrived, the callback fires immediately with the stored
    /// response. Returns self for chaining.
    pub fn receive(
        self: &Arc<Self>,
        status: &str,
        callback: impl Fn(Value) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let callback: PushCallback = Arc::new(callback);
        let already_received = {
            let mut state = self.state.lock().unwrap();
            state.rec_hooks.push((status.to_string(), Arc::clone(&callback)));
            state
                .received_resp
                .as_ref()
                .filter(|(s, _)| s == status)
                .map(|(_, response)| response.clone())
        };
        if let Some(response) = already_received {
            callback(response);
        }
        Arc::clone(self)
    }

    /// Transmit through the socket (buffered if it is not yet connected).
    /// A push that already timed out locally stays dead.
    pub(crate) async fn send(self: &Arc<Self>) {
        if self.has_received("timeout") {
            return;
        }
        self.start_timeout().await;
        {
            let mut state = self.state.lock().unwrap();
            state.sent = true;
        }
        self.channel.register_push(self).await;

        let mut message = Message::new(
            self.channel.topic().to_string(),
            Event::from(self.event.as_str()),
            self.payload.clone(),
        );
        if let Some(ref_id) = self.ref_id() {
            message = message.with_ref(ref_id);
        }
        if let Some(join_ref) = self.channel.join_ref().await {
            message = message.with_join_ref(join_ref);
        }

        if let Err(e) = self.channel.socket().push(message).await {
            tracing::error!(
                "failed to push `{}` on `{}`: {e}",
                self.event,
                self.channel.topic()
            );
        }
    }

    /// Cancel any outstanding timeout, forget the previous attempt, and
    /// send again under a fresh ref.
    pub(crate) async fn resend(self: &Arc<Self>, timeout: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            state.timeout = timeout;
            if let Some(task) = state.timeout_task.take() {
                task.abort();
            }
            state.ref_id = None;
            state.ref_event = None;
            state.received_resp = None;
            state.sent = false;
        }
        self.channel.unregister_push(self).await;
        self.send().await;
    }

    /// Arm the reply timeout and take a fresh ref. A no-op while a timer is
    /// already running, so buffered pushes keep their ref when flushed.
    pub(crate) async fn start_timeout(self: &Arc<Self>) {
        if self.state.lock().unwrap().timeout_task.is_some() {
            return;
        }

        let ref_id = self.channel.socket().make_ref().await;
        let timeout = {
            let mut state = self.state.lock().unwrap();
            state.ref_event = Some(reply_event_name(&ref_id));
            state.ref_id = Some(ref_id);
            state.timeout
        };

        let push = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            push.handle_timeout().await;
        });
        self.state.lock().unwrap().timeout_task = Some(task);
    }

    pub(crate) fn abort_timeout(&self) {
        if let Some(task) = self.state.lock().unwrap().timeout_task.take() {
            task.abort();
        }
    }

    /// Record the first response for this ref and fire the hooks registered
    /// for its status, in registration order. Later responses, including a
    /// real reply arriving after a local timeout, are discarded.
    pub(crate) fn trigger(&self, status: &str, response: Value) {
        let hooks: Vec<PushCallback> = {
            let mut state = self.state.lock().unwrap();
            if state.received_resp.is_some() {
                return;
            }
            if let Some(task) = state.timeout_task.take() {
                task.abort();
            }
            state.received_resp = Some((status.to_string(), response.clone()));
            state
                .rec_hooks
                .iter()
                .filter(|(s, _)| s == status)
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        for hook in hooks {
            hook(response.clone());
        }
    }

    /// Synthesize a local timeout response; no network involvement.
    async fn handle_timeout(self: &Arc<Self>) {
        tracing::debug!(
            "push `{}` on `{}` timed out",
            self.event,
            self.channel.topic()
        );
        // Unregister first so a late real reply is ignored.
        self.channel.unregister_push(self).await;
        self.trigger("timeout", serde_json::json!({}));
    }
}
