use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::gaps::{detect_gaps, Gap, GAP_THRESHOLD_SECS};
use super::trace::TraceParser;
use crate::protocol::{
    text_footer, text_header, text_line, write_stats, EventRecord, FooterRecord, HeaderRecord,
    LifecycleKind, ProtocolPaths, ProtocolStats,
};

/// Logger name the live recorder writes its diagnostic trace with
pub const DEFAULT_LOGGER: &str = "protocol-agent";

const DEFAULT_PROVIDER: &str = "deepgram";

/// Parsed structured record stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStream {
    pub header: Option<HeaderRecord>,
    pub footer: Option<FooterRecord>,
    /// Lifecycle and transcript records in file order
    pub core: Vec<EventRecord>,
}

impl RecordStream {
    /// Parse JSON Lines content; malformed lines are skipped with a warning
    pub fn parse(content: &str) -> Self {
        let mut stream = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match EventRecord::from_json_line(line) {
                Ok(EventRecord::Header(header)) => stream.header = Some(header),
                Ok(EventRecord::Footer(footer)) => stream.footer = Some(footer),
                Ok(record) => stream.core.push(record),
                Err(e) => warn!("Skipping malformed record on line {}: {}", index + 1, e),
            }
        }

        stream
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read record stream {}", path.display()))?;
        Ok(Self::parse(&content))
    }
}

/// Key used to recognize the same record across independently produced streams
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    timestamp: NaiveTime,
    kind: &'static str,
    participant: String,
    payload: String,
}

impl Signature {
    /// `None` for header and footer records
    pub fn of(record: &EventRecord) -> Option<Self> {
        match record {
            EventRecord::Transcript(t) => Some(Self {
                timestamp: t.timestamp,
                kind: "transcript",
                participant: t.participant.clone(),
                // All whitespace removed: split-word artifacts ("dri n" vs "drin") still match.
                payload: t.text.split_whitespace().collect(),
            }),
            EventRecord::Lifecycle(e) => Some(Self {
                timestamp: e.timestamp,
                kind: "event",
                participant: e.participant.clone(),
                payload: e.kind.as_str().to_string(),
            }),
            EventRecord::Header(_) | EventRecord::Footer(_) => None,
        }
    }

    /// Signature of a lifecycle record stamped one second earlier.
    ///
    /// The recorder stamps a join/leave before logging it, so the log line can
    /// fall on the next second; recovered lifecycle lines are matched against both.
    /// A genuine repeat of the same event within that second is dropped.
    pub fn of_previous_second(record: &EventRecord) -> Option<Self> {
        match record {
            EventRecord::Lifecycle(e) => Self::of(&EventRecord::lifecycle(
                e.timestamp - chrono::Duration::seconds(1),
                &e.participant,
                e.kind,
            )),
            _ => None,
        }
    }
}

/// Calendar date and inclusive time bounds of the recorded session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SessionWindow {
    /// Bounds default to the header start / footer end, else the whole day
    pub fn for_stream(
        stream: &RecordStream,
        date: NaiveDate,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
    ) -> Self {
        let start = start
            .or_else(|| stream.header.as_ref().map(|h| h.started_at))
            .unwrap_or_default();
        let end = end
            .or_else(|| stream.footer.as_ref().map(|f| f.ended_at))
            .unwrap_or_else(end_of_day);

        Self {
            date,
            start: date.and_time(start),
            end: date.and_time(end),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn at(&self, time: NaiveTime) -> NaiveDateTime {
        self.date.and_time(time)
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
}

/// Reconciled record stream produced by one repair pass
#[derive(Debug, Clone)]
pub struct RepairedProtocol {
    pub window: SessionWindow,
    pub room: String,
    pub header: Option<HeaderRecord>,
    pub records: Vec<EventRecord>,
    pub footer: FooterRecord,
    pub gaps: Vec<Gap>,
    pub recovered: usize,
    pub stats: ProtocolStats,
}

impl RepairedProtocol {
    /// Structured stream: header (if any), merged records, footer
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();

        let header = self.header.clone().map(EventRecord::Header);
        let footer = EventRecord::Footer(self.footer.clone());
        for record in header.iter().chain(&self.records).chain(std::iter::once(&footer)) {
            out.push_str(&record.to_json_line()?);
            out.push('\n');
        }

        Ok(out)
    }

    /// Text transcript, rendered exactly like the live store renders it
    pub fn to_text(&self, statistics: bool) -> String {
        let (started, provider) = match &self.header {
            Some(h) => (self.window.at(h.started_at), h.stt_provider.as_str()),
            None => (self.window.start, DEFAULT_PROVIDER),
        };

        let mut out = text_header(started, &self.room, provider);
        for record in &self.records {
            if let Some(line) = text_line(record) {
                out.push_str(&line);
            }
        }
        out.push_str(&text_footer(
            self.window.at(self.footer.ended_at),
            statistics.then_some(&self.stats),
        ));

        out
    }
}

/// Rebuilds missing records of a recorded protocol from a diagnostic trace
pub struct RepairEngine {
    parser: TraceParser,
    threshold_secs: i64,
}

impl RepairEngine {
    pub fn new(logger: &str) -> Result<Self> {
        Ok(Self {
            parser: TraceParser::new(logger).context("Invalid trace grammar")?,
            threshold_secs: GAP_THRESHOLD_SECS,
        })
    }

    /// Merge records recovered from `trace` into the gaps of `stream`.
    ///
    /// Only trace records that fall strictly inside a detected gap and whose
    /// signature is not already present are admitted, so repairing a repaired
    /// stream adds nothing.
    pub fn repair(
        &self,
        stream: &RecordStream,
        trace: &str,
        window: SessionWindow,
        room: &str,
    ) -> RepairedProtocol {
        let mut seen: HashSet<Signature> = stream.core.iter().filter_map(Signature::of).collect();

        let mut existing: Vec<(NaiveDateTime, EventRecord)> = stream
            .core
            .iter()
            .map(|record| (window.at(record.timestamp()), record.clone()))
            .collect();
        existing.sort_by_key(|(at, _)| *at);

        let times: Vec<NaiveDateTime> = existing.iter().map(|(at, _)| *at).collect();
        let gaps = detect_gaps(&times, self.threshold_secs);
        for gap in &gaps {
            info!("Detected gap: {}", gap);
        }

        let mut recovered = Vec::new();
        if !gaps.is_empty() {
            for entry in trace.lines().filter_map(|line| self.parser.parse_line(line)) {
                if !window.contains(entry.logged_at) {
                    continue;
                }
                if !gaps.iter().any(|gap| gap.contains(entry.logged_at)) {
                    continue;
                }
                let Some(signature) = Signature::of(&entry.record) else {
                    continue;
                };
                if Signature::of_previous_second(&entry.record).is_some_and(|s| seen.contains(&s)) {
                    continue;
                }
                // Also dedups the trace against itself.
                if seen.insert(signature) {
                    // Merged by record time, like existing records; the log
                    // time only decides gap membership.
                    recovered.push((window.at(entry.record.timestamp()), entry.record));
                }
            }
        }

        info!("Found {} missing records in trace within gaps", recovered.len());
        let recovered_count = recovered.len();

        // Stable sort: equal times keep existing-before-recovered insertion order.
        let mut merged = existing;
        merged.extend(recovered);
        merged.sort_by_key(|(at, _)| *at);
        let records: Vec<EventRecord> = merged.into_iter().map(|(_, record)| record).collect();

        let footer = stream.footer.clone().unwrap_or_else(|| FooterRecord {
            ended_at: records
                .last()
                .map(EventRecord::timestamp)
                .unwrap_or_else(|| window.end.time()),
        });

        let started_at = stream
            .header
            .as_ref()
            .map(|h| h.started_at)
            .unwrap_or_else(|| window.start.time());
        let stats = replay_stats(room, started_at, footer.ended_at, &records);

        RepairedProtocol {
            window,
            room: room.to_string(),
            header: stream.header.clone(),
            records,
            footer,
            gaps,
            recovered: recovered_count,
            stats,
        }
    }
}

/// Recompute statistics by replaying every record
fn replay_stats(
    room: &str,
    started_at: NaiveTime,
    ended_at: NaiveTime,
    records: &[EventRecord],
) -> ProtocolStats {
    let mut stats = ProtocolStats::new(room, started_at);
    stats.ended_at = Some(ended_at);

    for record in records {
        match record {
            EventRecord::Transcript(t) => stats.record_speech(&t.participant, &t.text),
            EventRecord::Lifecycle(e) if e.kind == LifecycleKind::Joined => {
                stats.record_join(&e.participant, e.timestamp)
            }
            EventRecord::Lifecycle(e) if e.kind == LifecycleKind::Left => {
                stats.record_leave(&e.participant, e.timestamp)
            }
            _ => {}
        }
    }

    stats
}

/// Inputs of one repair run; unset values are derived from the input stream
#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub input: PathBuf,
    /// Defaults to `transcribe.txt` next to the input
    pub trace: Option<PathBuf>,
    /// Defaults to the input's directory
    pub output_dir: Option<PathBuf>,
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub room: Option<String>,
    pub statistics: bool,
    pub logger: String,
}

impl RepairOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            trace: None,
            output_dir: None,
            date: None,
            start: None,
            end: None,
            room: None,
            statistics: true,
            logger: DEFAULT_LOGGER.to_string(),
        }
    }
}

/// Outcome of a repair run
#[derive(Debug, Clone)]
pub struct RepairReport {
    pub gaps: Vec<Gap>,
    pub existing: usize,
    pub recovered: usize,
    pub outputs: ProtocolPaths,
}

/// Room and date encoded in a `protocol_<room>_<YYYYMMDD>_<HHMMSS>[_REPAIRED...]` file stem
pub fn parse_protocol_stem(stem: &str) -> Option<(String, NaiveDate)> {
    let pattern = Regex::new(r"^protocol_(.+)_(\d{8})_\d{6}(?:_REPAIRED)*$").ok()?;
    let caps = pattern.captures(stem)?;
    let date = NaiveDate::parse_from_str(&caps[2], "%Y%m%d").ok()?;
    Some((caps[1].to_string(), date))
}

/// Load the input stream and trace, repair, and write the repaired file set.
///
/// Fails if the input stream is missing; a missing trace only recovers nothing.
pub fn run(options: &RepairOptions) -> Result<RepairReport> {
    let input = &options.input;
    info!("Loading {}", input.display());
    let stream = RecordStream::load(input)?;
    info!("Loaded {} existing records", stream.core.len());

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "protocol".to_string());
    let from_name = parse_protocol_stem(&stem);

    let date = match (options.date, &from_name) {
        (Some(date), _) => date,
        (None, Some((_, date))) => *date,
        (None, None) => {
            let modified = fs::metadata(input)
                .and_then(|m| m.modified())
                .with_context(|| format!("Could not determine session date of {}", input.display()))?;
            let date = chrono::DateTime::<chrono::Local>::from(modified).date_naive();
            warn!("No session date given, using file modification date {}", date);
            date
        }
    };

    let room = options
        .room
        .clone()
        .or_else(|| stream.header.as_ref().map(|h| h.room.clone()))
        .or_else(|| from_name.map(|(room, _)| room))
        .unwrap_or_else(|| "unknown".to_string());

    let trace_path = options.trace.clone().unwrap_or_else(|| {
        input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("transcribe.txt")
    });
    let trace = match fs::read(&trace_path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Could not read trace {}: {}, nothing to recover", trace_path.display(), e);
            String::new()
        }
    };

    let window = SessionWindow::for_stream(&stream, date, options.start, options.end);
    let engine = RepairEngine::new(&options.logger)?;
    let repaired = engine.repair(&stream, &trace, window, &room);

    let output_dir = options
        .output_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Could not create {}", output_dir.display()))?;
    let outputs = ProtocolPaths::with_base(&output_dir, &format!("{stem}_REPAIRED"));

    // Each file is rendered completely before it is written.
    let json = repaired.to_json_lines()?;
    let text = repaired.to_text(options.statistics);

    info!("Writing {}", outputs.records.display());
    fs::write(&outputs.records, json)
        .with_context(|| format!("Could not write {}", outputs.records.display()))?;
    info!("Writing {}", outputs.text.display());
    fs::write(&outputs.text, text)
        .with_context(|| format!("Could not write {}", outputs.text.display()))?;
    if options.statistics {
        write_stats(&outputs.stats, &repaired.stats)?;
    }

    Ok(RepairReport {
        gaps: repaired.gaps,
        existing: stream.core.len(),
        recovered: repaired.recovered,
        outputs,
    })
}
