//! In-process transport for exercising the socket without a network.

use async_trait::async_trait;
use phx_realtime::types::constants::{phoenix_events, PHOENIX_TOPIC};
use phx_realtime::{Message, RealtimeError, Result, Transport, TransportEvent, TransportSink};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A transport whose "server" is scripted from the test body: it records
/// every decoded outbound frame, optionally acks joins and heartbeats, and
/// can inject inbound frames or drop the connection on demand.
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    sent: Vec<Message>,
    connects: usize,
    fail_connects: usize,
    ack_joins: bool,
    ack_heartbeats: bool,
    event_tx: Option<mpsc::Sender<TransportEvent>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner {
                sent: Vec::new(),
                connects: 0,
                fail_connects: 0,
                ack_joins: false,
                ack_heartbeats: false,
                event_tx: None,
            })),
        })
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.lock().unwrap().fail_connects = n;
    }

    /// Reply `ok` to every `phx_join` as soon as it is sent.
    pub fn ack_joins(&self) {
        self.inner.lock().unwrap().ack_joins = true;
    }

    /// Ack every heartbeat probe.
    pub fn ack_heartbeats(&self) {
        self.inner.lock().unwrap().ack_heartbeats = true;
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    /// Every frame the client has sent, decoded, across all connections.
    pub fn sent(&self) -> Vec<Message> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_with_event(&self, event: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|m| m.event.as_str() == event)
            .collect()
    }

    /// Push a frame from the "server" into the live connection.
    pub async fn inject(&self, message: &Message) {
        let text = serde_json::to_string(message).unwrap();
        let tx = self.inner.lock().unwrap().event_tx.clone();
        tx.expect("no live connection")
            .send(TransportEvent::Message(text))
            .await
            .unwrap();
    }

    /// Reply `status` to a previously captured frame, echoing its ref.
    pub async fn reply(&self, to: &Message, status: &str, response: serde_json::Value) {
        self.inject(&reply_to(to, status, response)).await;
    }

    /// Sever the live connection from the server side.
    pub async fn drop_connection(&self) {
        let tx = self.inner.lock().unwrap().event_tx.take();
        if let Some(tx) = tx {
            let _ = tx
                .send(TransportEvent::Closed {
                    code: Some(1006),
                    reason: Some("abnormal closure".to_string()),
                })
                .await;
        }
    }
}

fn reply_to(to: &Message, status: &str, response: serde_json::Value) -> Message {
    let mut reply = Message::new(
        to.topic.clone(),
        phoenix_events::REPLY.into(),
        json!({"status": status, "response": response}),
    );
    if let Some(r) = &to.r#ref {
        reply = reply.with_ref(r.clone());
    }
    if let Some(jr) = &to.join_ref {
        reply = reply.with_join_ref(jr.clone());
    }
    reply
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _headers: &[(String, String)],
    ) -> Result<(Box<dyn TransportSink>, mpsc::Receiver<TransportEvent>)> {
        let (tx, rx) = mpsc::channel(64);
        {
            let mut inner = self.inner.lock().unwrap();
            inner.connects += 1;
            if inner.fail_connects > 0 {
                inner.fail_connects -= 1;
                return Err(RealtimeError::Transport(
                    "scripted connect failure".to_string(),
                ));
            }
            inner.event_tx = Some(tx.clone());
        }
        Ok((
            Box::new(MockSink {
                inner: Arc::clone(&self.inner),
                event_tx: tx,
            }),
            rx,
        ))
    }
}

struct MockSink {
    inner: Arc<Mutex<Inner>>,
    event_tx: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, text: String) -> Result<()> {
        let message: Message = serde_json::from_str(&text)?;
        let auto_reply = {
            let mut inner = self.inner.lock().unwrap();
            inner.sent.push(message.clone());
            let event = message.event.as_str();
            let ack = (inner.ack_joins && event == phoenix_events::JOIN)
                || (inner.ack_heartbeats
                    && message.topic == PHOENIX_TOPIC
                    && event == phoenix_events::HEARTBEAT);
            ack.then(|| reply_to(&message, "ok", json!({})))
        };
        if let Some(reply) = auto_reply {
            let text = serde_json::to_string(&reply).unwrap();
            let _ = self.event_tx.send(TransportEvent::Message(text)).await;
        }
        Ok(())
    }

    async fn close(&mut self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        let _ = self.event_tx.send(TransportEvent::Closed { code, reason }).await;
        Ok(())
    }
}

/// Poll `probe` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if probe().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
