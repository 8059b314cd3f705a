//! Meeting protocol model and storage
//!
//! This module provides:
//! - The `EventRecord` model written to the JSON Lines record stream
//! - Running participant/meeting statistics
//! - Text transcript rendering
//! - The `ProtocolStore` that owns both output sinks

mod record;
mod render;
mod stats;
mod store;

use chrono::{NaiveDateTime, SubsecRound};

pub use record::{
    collapse_whitespace, hms, word_count, EventRecord, FooterRecord, HeaderRecord, LifecycleKind,
    LifecycleRecord, TranscriptRecord,
};
pub use render::{text_footer, text_header, text_line};
pub use stats::{ParticipantStats, ParticipantSummary, ProtocolStats, StatsSummary};
pub use store::{write_stats, ProtocolPaths, ProtocolStore, StoreError, StoreOptions};

/// Current local wall-clock time, truncated to whole seconds
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local().trunc_subsecs(0)
}
