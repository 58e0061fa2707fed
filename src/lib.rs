//! # phx-realtime
//!
//! A client for Phoenix Channels-style realtime servers: one WebSocket
//! connection multiplexing any number of topic subscriptions, with
//! ref-correlated request/reply, heartbeat dead-connection detection, and
//! automatic reconnect/rejoin with exponential backoff.
//!
//! ## Example
//!
//! ```no_run
//! use phx_realtime::{Socket, SocketOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket = Socket::new(
//!         "ws://localhost:4000/socket/websocket",
//!         SocketOptions::default(),
//!     )?;
//!     socket.connect().await?;
//!
//!     let channel = socket.channel("room:lobby", serde_json::json!({})).await;
//!     channel.on("new_msg", |payload, _ref| {
//!         println!("{payload}");
//!     }).await;
//!
//!     channel.join(None).await?
//!         .receive("ok", |_| println!("joined"))
//!         .receive("error", |resp| eprintln!("rejected: {resp}"));
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod infrastructure;
pub mod messaging;
pub mod socket;
pub mod transport;
pub mod types;

pub use channel::{Channel, ChannelStatus, Push};
pub use infrastructure::BackoffTimer;
pub use messaging::{Event, JsonSerializer, Serializer, SystemEvent};
pub use socket::{ConnectionState, Socket, SocketBuilder, SocketOptions};
pub use transport::{Transport, TransportEvent, TransportSink};
pub use types::{Message, RealtimeError, Result};
