pub mod constants;
pub mod error;
pub mod message;

pub use error::{RealtimeError, Result};
pub use message::Message;
