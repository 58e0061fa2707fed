/// Phoenix protocol event strings (magic strings layer)
pub mod phoenix_events {
    pub const CLOSE: &str = "phx_close";
    pub const ERROR: &str = "phx_error";
    pub const JOIN: &str = "phx_join";
    pub const REPLY: &str = "phx_reply";
    pub const LEAVE: &str = "phx_leave";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Reserved topic for heartbeat traffic
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Prefix of the per-push reply event name (`chan_reply_<ref>`)
pub const REPLY_EVENT_PREFIX: &str = "chan_reply_";

/// Protocol version appended to the connection URL
pub const VSN: &str = "1.0.0";

/// Default push timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10_000;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 30_000;

/// Default longpoller timeout (milliseconds), recognized for longpoll transports
pub const LONGPOLLER_TIMEOUT: u64 = 20_000;

/// Default reconnect backoff table (milliseconds); the last entry repeats
pub const RECONNECT_INTERVALS: [u64; 4] = [1_000, 2_000, 5_000, 10_000];
pub const DEFAULT_RECONNECT_FALLBACK: u64 = 10_000;

/// Max messages held in the socket send buffer while disconnected
pub const MAX_SEND_BUFFER_SIZE: usize = 1_000;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1_000;
