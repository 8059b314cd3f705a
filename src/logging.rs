//! Diagnostic trace formatting
//!
//! Every log line is written as
//! `YYYY-MM-DD HH:MM:SS,mmm - <logger> - LEVEL - message`, which is the grammar
//! the repair tool reads back when rebuilding a protocol.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::repair::DEFAULT_LOGGER;

/// Event formatter producing trace lines
#[derive(Debug, Clone)]
pub struct TraceLineFormat {
    logger: String,
}

impl TraceLineFormat {
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
        }
    }
}

impl Default for TraceLineFormat {
    fn default() -> Self {
        Self::new(DEFAULT_LOGGER)
    }
}

pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for TraceLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now();
        write!(
            writer,
            "{} - {} - {} - ",
            now.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.logger,
            level_name(event.metadata().level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber; `debug` raises the level from INFO to DEBUG
pub fn init(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .event_format(TraceLineFormat::default())
        .init();
}
