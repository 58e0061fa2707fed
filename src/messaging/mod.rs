mod event;
mod router;
mod serializer;

pub use event::{reply_event_name, Event, SystemEvent};
pub use router::MessageRouter;
pub use serializer::{JsonSerializer, Serializer};
