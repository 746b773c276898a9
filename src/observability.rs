//! Optional structured logging sink (spec §6).
//!
//! Every primitive accepts an `Arc<dyn Logger>` at construction and falls
//! back to a shared [`NoopLogger`] otherwise, so the sink costs nothing on
//! the hot path when the caller hasn't wired one up. When the
//! `tracing-log` feature is enabled (default), [`TracingLogger`] forwards
//! records to the `tracing` facade at the configured level.

use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::sealed::Sealed;

/// Minimum severity a [`Logger`] should emit. Mirrors the upstream
/// `ENABLE_LOGGING_{INFO|DEBUG|TRACE}` compile-time flags, but resolved as a
/// single runtime gate (see `SPEC_FULL.md` §4.14 / §9.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Sets the process-wide minimum log level observed by [`TracingLogger`]
/// (and by any caller-supplied `Logger` that chooses to respect it via
/// [`min_level`]).
pub fn set_min_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Reads the process-wide minimum log level set by [`set_min_level`].
pub fn min_level() -> LogLevel {
    match MIN_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Off,
        1 => LogLevel::Error,
        2 => LogLevel::Warn,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

/// A single structured log record, as specified in §6: free-form key/value
/// fields with a minimal required set of `{ obj, op, id? }`.
pub struct LogRecord<'a> {
    /// Stable object identifier, e.g. `"AsyncSemaphore"`.
    pub obj: &'static str,
    /// The operation being logged, e.g. `"wait"`, `"signal"`.
    pub op: &'static str,
    /// A human-readable waiter/object id, when one is meaningful.
    pub id: Option<u64>,
    /// Severity of this record.
    pub level: LogLevel,
    /// Additional free-form fields.
    pub fields: &'a [(&'static str, &'a dyn Display)],
}

/// The logging sink contract. Implementations must be cheap to call on the
/// hot path — primitives call this from inside their critical section.
pub trait Logger: Send + Sync + Sealed {
    fn log(&self, record: LogRecord<'_>);
}

/// The default sink: discards everything. Cloning this crate's primitives
/// without supplying a logger costs exactly one branch per call site.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopLogger;

impl Sealed for NoopLogger {}

impl Logger for NoopLogger {
    #[inline]
    fn log(&self, _record: LogRecord<'_>) {}
}

/// Forwards [`LogRecord`]s to the `tracing` facade, gated by [`min_level`].
///
/// Available when the `tracing-log` feature is enabled (default).
#[cfg(feature = "tracing-log")]
#[derive(Default, Debug, Clone, Copy)]
pub struct TracingLogger;

#[cfg(feature = "tracing-log")]
impl Sealed for TracingLogger {}

#[cfg(feature = "tracing-log")]
impl Logger for TracingLogger {
    fn log(&self, record: LogRecord<'_>) {
        if record.level > min_level() {
            return;
        }
        match record.level {
            LogLevel::Off => {}
            LogLevel::Error => {
                tracing::error!(obj = record.obj, op = record.op, id = record.id, "spark-sync")
            }
            LogLevel::Warn => {
                tracing::warn!(obj = record.obj, op = record.op, id = record.id, "spark-sync")
            }
            LogLevel::Info => {
                tracing::info!(obj = record.obj, op = record.op, id = record.id, "spark-sync")
            }
            LogLevel::Debug => {
                tracing::debug!(obj = record.obj, op = record.op, id = record.id, "spark-sync")
            }
            LogLevel::Trace => {
                tracing::trace!(obj = record.obj, op = record.op, id = record.id, "spark-sync")
            }
        }
    }
}

/// Returns the crate-default logger: [`TracingLogger`] when `tracing-log`
/// is enabled, [`NoopLogger`] otherwise.
pub fn default_logger() -> Arc<dyn Logger> {
    #[cfg(feature = "tracing-log")]
    {
        Arc::new(TracingLogger)
    }
    #[cfg(not(feature = "tracing-log"))]
    {
        Arc::new(NoopLogger)
    }
}
