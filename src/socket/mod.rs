mod builder;
mod connection;
mod core;
mod state;

pub use builder::{SocketBuilder, SocketOptions};
pub use connection::{ConnectionManager, ConnectionState};
pub use core::Socket;
pub use state::{SocketCallback, SocketErrorCallback, SocketState};
