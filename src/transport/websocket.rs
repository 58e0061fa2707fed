use super::{Transport, TransportEvent, TransportSink};
use crate::types::{RealtimeError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Production transport over `tokio-tungstenite`.
///
/// A pump task translates frames into [`TransportEvent`]s so the socket's
/// read loop never touches tungstenite types.
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(Box<dyn TransportSink>, mpsc::Receiver<TransportEvent>)> {
        let mut request = url.into_client_request()?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RealtimeError::Transport(format!("invalid header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RealtimeError::Transport(format!("invalid header value for `{name}`: {e}")))?;
            request.headers_mut().append(name, value);
        }

        let (stream, _response) = connect_async(request).await?;
        let (write_half, mut read_half) = stream.split();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(frame) = read_half.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if tx.send(TransportEvent::Message(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), Some(f.reason.to_string())),
                            None => (None, None),
                        };
                        let _ = tx.send(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                    Ok(WsMessage::Binary(data)) => {
                        tracing::warn!("ignoring unexpected binary frame ({} bytes)", data.len());
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = tx
                            .send(TransportEvent::Closed {
                                code: None,
                                reason: None,
                            })
                            .await;
                        return;
                    }
                }
            }
            // Stream ended without a close frame.
            let _ = tx
                .send(TransportEvent::Closed {
                    code: None,
                    reason: None,
                })
                .await;
        });

        Ok((Box::new(WebSocketSink { inner: write_half }), rx))
    }
}

struct WebSocketSink {
    inner: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.inner.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        if let Some(code) = code {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.unwrap_or_default().into(),
            };
            self.inner.send(WsMessage::Close(Some(frame))).await?;
        }
        self.inner.close().await?;
        Ok(())
    }
}
