mod core;
mod push;
mod state;

pub use core::Channel;
pub use push::Push;
pub use state::{ChannelState, ChannelStatus, EventBinding, EventCallback};
