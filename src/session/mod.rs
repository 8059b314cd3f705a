//! Live session supervision
//!
//! This module provides the `SessionSupervisor` that manages:
//! - One lifecycle state machine per participant (join, idle pause, resume, leave)
//! - Transcription session open/close through the room runtime
//! - Group idle-timeout detection
//! - Normalizing utterances into transcript records for the protocol store

mod config;
mod participant;
mod runtime;
mod supervisor;

pub use config::SupervisorConfig;
pub use participant::{ParticipantSession, ParticipantSnapshot, SessionState};
pub use runtime::{RoomEvent, RoomRuntime, TranscriptionSession};
pub use supervisor::SessionSupervisor;
