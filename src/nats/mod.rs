pub mod client;
pub mod messages;
pub mod runtime;

pub use client::NatsClient;
pub use messages::{RoomEventMessage, SessionControlMessage, TranscriptMessage};
pub use runtime::NatsRoomRuntime;
