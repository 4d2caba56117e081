//! # Logging
//!
//! Console logs go to stderr, colored by level. Stdout is reserved for
//! benchmark output, which the harness parses, so nothing here may write
//! to it.
//!
//! `RUST_LOG` takes precedence over the `-v` count. An optional log file
//! receives the same events as plain text through a non-blocking writer;
//! keep the returned [`LoggingGuard`] alive until exit so it gets flushed.

use anyhow::{Context, Result};
use colored::*;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Formatter that prints only the event fields, with the whole line colored
/// by severity.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
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
        // Fields are buffered so the color covers the entire line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Keeps the file writer's worker thread alive
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Filter directive for a `-v` count on top of `base`.
pub fn verbosity_directive(base: Level, verbose: u8) -> &'static str {
    let level = match verbose {
        0 => base,
        // More verbose levels compare greater.
        1 => base.max(Level::DEBUG),
        _ => Level::TRACE,
    };
    match level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// Install the global subscriber.
///
/// `base` is the level used with no `-v` and no `RUST_LOG`.
pub fn init(base: Level, verbose: u8, log_file: Option<&Path>) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(base, verbose)));

    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter)
        .with_writer(io::stderr);

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directive() {
        assert_eq!(verbosity_directive(Level::INFO, 0), "info");
        assert_eq!(verbosity_directive(Level::INFO, 1), "debug");
        assert_eq!(verbosity_directive(Level::INFO, 2), "trace");
        assert_eq!(verbosity_directive(Level::WARN, 0), "warn");
        assert_eq!(verbosity_directive(Level::WARN, 1), "debug");
        assert_eq!(verbosity_directive(Level::WARN, 5), "trace");
    }

    // Only test in this binary that installs the global subscriber.
    #[test]
    fn test_init_writes_log_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("harness.log");

        let guard = init(Level::INFO, 0, Some(&path)).unwrap();
        tracing::error!("log file marker");
        drop(guard);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("log file marker"));
        assert!(init(Level::INFO, 0, None).is_err());
    }
}
