pub mod config;
pub mod logging;
pub mod nats;
pub mod protocol;
pub mod repair;
pub mod session;
pub mod stt;

pub use config::{OutputFormat, ProtocolConfig};
pub use nats::{NatsClient, NatsRoomRuntime};
pub use protocol::{EventRecord, LifecycleKind, ProtocolStats, ProtocolStore, StoreError, StoreOptions};
pub use repair::{RepairEngine, RepairOptions, RepairReport};
pub use session::{RoomEvent, RoomRuntime, SessionSupervisor, SupervisorConfig, TranscriptionSession};
pub use stt::{SttProvider, SttSettings};
