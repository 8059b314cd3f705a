use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::record::{EventRecord, FooterRecord, HeaderRecord, LifecycleKind};
use super::render;
use super::stats::ProtocolStats;
use crate::config::OutputFormat;

/// Errors surfaced by the protocol store.
///
/// Any error from `append`/`finalize` means the log can no longer be trusted
/// to be complete; callers treat it as fatal to the current recording.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("protocol store is not open")]
    NotOpen,

    #[error("{0} records are written by the store itself")]
    Framing(&'static str),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// File locations of one protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolPaths {
    pub text: PathBuf,
    pub records: PathBuf,
    pub stats: PathBuf,
}

impl ProtocolPaths {
    /// `protocol_<room>_<YYYYMMDD_HHMMSS>` inside `dir`
    pub fn new(dir: &Path, room: &str, started: NaiveDateTime) -> Self {
        let base = format!("protocol_{}_{}", room, started.format("%Y%m%d_%H%M%S"));
        Self::with_base(dir, &base)
    }

    pub fn with_base(dir: &Path, base: &str) -> Self {
        Self {
            text: dir.join(format!("{base}.txt")),
            records: dir.join(format!("{base}.jsonl")),
            stats: dir.join(format!("{base}_stats.json")),
        }
    }
}

/// Settings fixed for the lifetime of a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub room: String,
    pub stt_provider: String,
    pub output_format: OutputFormat,
    pub statistics: bool,
    pub output_dir: PathBuf,
    pub started: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Open,
    Finalized,
}

struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Sink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Write and flush immediately so every record survives a crash
    fn write(&mut self, data: &str) -> Result<()> {
        self.writer
            .write_all(data.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

struct StoreState {
    phase: Phase,
    text: Option<Sink>,
    records: Option<Sink>,
    stats: ProtocolStats,
}

/// Append-only dual-format meeting log (text transcript + JSON Lines records).
///
/// All mutation goes through one store-wide mutex, held only while a record
/// is formatted, written and flushed.
pub struct ProtocolStore {
    options: StoreOptions,
    paths: ProtocolPaths,
    state: Mutex<StoreState>,
}

impl ProtocolStore {
    pub fn new(options: StoreOptions) -> Self {
        let paths = ProtocolPaths::new(&options.output_dir, &options.room, options.started);
        let stats = ProtocolStats::new(&options.room, options.started.time());

        Self {
            options,
            paths,
            state: Mutex::new(StoreState {
                phase: Phase::Created,
                text: None,
                records: None,
                stats,
            }),
        }
    }

    pub fn paths(&self) -> &ProtocolPaths {
        &self.paths
    }

    pub fn room(&self) -> &str {
        &self.options.room
    }

    pub fn is_open(&self) -> bool {
        self.lock().phase == Phase::Open
    }

    /// Snapshot of the running statistics
    pub fn stats(&self) -> ProtocolStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create both sinks and write their headers. Calling again is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.lock();
        if state.phase != Phase::Created {
            return Ok(());
        }

        fs::create_dir_all(&self.options.output_dir).map_err(|source| StoreError::Io {
            path: self.options.output_dir.clone(),
            source,
        })?;

        let format = self.options.output_format;

        if format.writes_text() {
            let mut sink = Sink::create(&self.paths.text)?;
            sink.write(&render::text_header(
                self.options.started,
                &self.options.room,
                &self.options.stt_provider,
            ))?;
            state.text = Some(sink);
        }

        if format.writes_records() {
            let mut sink = Sink::create(&self.paths.records)?;
            let header = EventRecord::Header(HeaderRecord {
                room: self.options.room.clone(),
                started_at: self.options.started.time(),
                stt_provider: self.options.stt_provider.clone(),
            });
            sink.write(&format!("{}\n", header.to_json_line()?))?;
            state.records = Some(sink);
        }

        state.phase = Phase::Open;
        info!("Protocol files created: protocol_{}", self.options.room);

        Ok(())
    }

    /// Append one lifecycle or transcript record to both sinks.
    ///
    /// Rejected with [`StoreError::NotOpen`] before `initialize` and after `finalize`.
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        match record {
            EventRecord::Header(_) => return Err(StoreError::Framing("header")),
            EventRecord::Footer(_) => return Err(StoreError::Framing("footer")),
            _ => {}
        }

        let mut state = self.lock();
        if state.phase != Phase::Open {
            return Err(StoreError::NotOpen);
        }

        match record {
            EventRecord::Transcript(t) => state.stats.record_speech(&t.participant, &t.text),
            EventRecord::Lifecycle(e) => match e.kind {
                LifecycleKind::Joined => state.stats.record_join(&e.participant, e.timestamp),
                LifecycleKind::Left => state.stats.record_leave(&e.participant, e.timestamp),
                _ => {}
            },
            _ => {}
        }

        if let Some(sink) = state.text.as_mut() {
            if let Some(line) = render::text_line(record) {
                sink.write(&line)?;
            }
        }

        if let Some(sink) = state.records.as_mut() {
            let line = record.to_json_line()?;
            sink.write(&format!("{line}\n"))?;
        }

        Ok(())
    }

    /// Write the closing blocks, close both sinks and persist the statistics artifact.
    ///
    /// No-op unless the store is open.
    pub fn finalize(&self, ended: NaiveDateTime) -> Result<()> {
        let mut state = self.lock();
        if state.phase != Phase::Open {
            debug!("finalize on a store that is not open, ignoring");
            return Ok(());
        }

        // Sinks are dropped (closed) at the end of this scope even if a write fails.
        state.phase = Phase::Finalized;
        let text = state.text.take();
        let records = state.records.take();
        state.stats.ended_at = Some(ended.time());

        let stats = self.options.statistics.then_some(&state.stats);

        if let Some(mut sink) = text {
            sink.write(&render::text_footer(ended, stats))?;
        }

        if let Some(mut sink) = records {
            let footer = EventRecord::Footer(FooterRecord {
                ended_at: ended.time(),
            });
            sink.write(&format!("{}\n", footer.to_json_line()?))?;
        }

        if let Some(stats) = stats {
            write_stats(&self.paths.stats, stats)?;
            info!("Statistics saved to: {}", self.paths.stats.display());
        }

        Ok(())
    }
}

/// Persist the statistics artifact as pretty-printed JSON
pub fn write_stats(path: &Path, stats: &ProtocolStats) -> Result<()> {
    let json = serde_json::to_string_pretty(&stats.summary())?;
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
