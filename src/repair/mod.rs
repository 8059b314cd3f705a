//! Offline protocol repair
//!
//! Detects temporal gaps in a recorded record stream and fills them with
//! records recovered from the recorder's diagnostic trace.

mod engine;
mod gaps;
mod trace;

pub use engine::{
    parse_protocol_stem, run, RecordStream, RepairEngine, RepairOptions, RepairReport,
    RepairedProtocol, SessionWindow, Signature, DEFAULT_LOGGER,
};
pub use gaps::{detect_gaps, Gap, GAP_THRESHOLD_SECS};
pub use trace::{TraceEntry, TraceParser};
