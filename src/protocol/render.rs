//! Human-readable protocol rendering
//!
//! Shared by the live store and the repair tool so both produce the same text form.

use chrono::NaiveDateTime;
use std::fmt::Write;

use super::record::{hms, EventRecord, LifecycleKind};
use super::stats::ProtocolStats;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn rule() -> String {
    "=".repeat(80)
}

/// Fixed header block opening a text protocol
pub fn text_header(started: NaiveDateTime, room: &str, stt_provider: &str) -> String {
    format!(
        "{rule}\nMeeting Protocol - {}\nRoom: {room}\nSTT Provider: {stt_provider}\n{rule}\n\n",
        started.format(DATETIME_FORMAT),
        rule = rule(),
    )
}

/// Text line(s) for a single record; header and footer render as blocks instead
pub fn text_line(record: &EventRecord) -> Option<String> {
    match record {
        EventRecord::Transcript(t) => Some(format!(
            "[{}] {}: {}\n",
            t.timestamp.format(hms::FORMAT),
            t.participant,
            t.text
        )),
        EventRecord::Lifecycle(e) => {
            let ts = e.timestamp.format(hms::FORMAT);
            let p = &e.participant;
            Some(match e.kind {
                LifecycleKind::Joined => format!("[{ts}] >>> {p} joined the meeting\n\n"),
                LifecycleKind::Left => format!("\n[{ts}] <<< {p} left the meeting\n\n"),
                LifecycleKind::IdlePaused => {
                    format!("\n[{ts}] ⏸️  {p} session paused (idle timeout)\n\n")
                }
                LifecycleKind::Resumed => format!("[{ts}] ▶️  {p} session resumed\n\n"),
            })
        }
        EventRecord::Header(_) | EventRecord::Footer(_) => None,
    }
}

/// Closing block, with the statistics summary when `stats` is given
pub fn text_footer(ended: NaiveDateTime, stats: Option<&ProtocolStats>) -> String {
    let mut out = format!("\n{}\nMeeting ended - {}\n", rule(), ended.format(DATETIME_FORMAT));

    if let Some(stats) = stats {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "\n--- Statistics ---\nTotal participants: {}\nTotal turns: {}\nTotal words: {}\n\nPer participant:\n",
            stats.participants.len(),
            stats.total_turns,
            stats.total_words
        );
        for (identity, p) in &stats.participants {
            let _ = writeln!(out, "  {identity}: {} words, {} turns", p.word_count, p.turn_count);
        }
    }

    out.push_str(&rule());
    out.push('\n');
    out
}
