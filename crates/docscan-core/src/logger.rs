//! Minimal logger.
//!
//! Records are written to stderr as `[elapsed LEVEL target] message`. Install
//! it once at startup with [`init_with_level`], or let [`init_from_env`] read
//! the level from `DOCSCAN_LOG`.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted by [`init_from_env`].
pub const LOG_ENV_VAR: &str = "DOCSCAN_LOG";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install the stderr logger with the level named in `DOCSCAN_LOG`
/// (`error`, `warn`, `info`, `debug`, `trace`, `off`), or `fallback` when the
/// variable is unset or unparsable.
pub fn init_from_env(fallback: LevelFilter) -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|raw| LevelFilter::from_str(raw.trim()).ok())
        .unwrap_or(fallback);
    init_with_level(level)
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// `log` records emitted by the pipeline are forwarded into the subscriber
/// through a [`tracing_log::LogTracer`]. Returns `false` if a logger or a
/// global subscriber was already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) -> bool {
    if tracing_log::LogTracer::init().is_err() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = if json {
        let subscriber = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.is_ok()
}
