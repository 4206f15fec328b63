//! Kernel logging infrastructure.
//!
//! A [`Logger`] fans messages out to registered [`LogSink`]s (the text
//! console, a serial port, a test capture buffer). Until a sink is added,
//! logging is a no-op; the kernel registers the console sink as soon as the
//! console driver is up.
//!
//! Use the `kinfo!`/`kwarn!`/`kerror!`/`kdebug!` macros rather than calling
//! [`write_message`] directly.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use crate::sync::SpinLock;

/// Ordered logging levels. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Unrecoverable or data-loss conditions.
    Error,
    /// Something is wrong but the kernel can continue.
    Warn,
    /// Normal operational messages.
    Info,
    /// Verbose diagnostics.
    Debug,
}

impl LogLevel {
    /// Short label used as the message prefix.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

/// A dyn-compatible output sink for the kernel logger.
pub trait LogSink: Send {
    /// Write a string fragment to this sink.
    fn write_str(&self, s: &str);
    /// Maximum log level accepted (messages with `level <= max_level` are
    /// written).
    fn max_level(&self) -> LogLevel;
    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// The kernel logger: a set of sinks behind one lock.
pub struct Logger {
    sinks: Vec<Box<dyn LogSink>>,
}

impl Logger {
    const fn new() -> Self {
        Self { sinks: Vec::new() }
    }
}

/// Global logger instance.
static LOGGER: SpinLock<Logger> = SpinLock::new(Logger::new());

/// Global verbosity ceiling applied before any sink filtering.
static GLOBAL_LEVEL: core::sync::atomic::AtomicU8 = core::sync::atomic::AtomicU8::new(2);

/// Set the global verbosity ceiling (normally from `kernel.conf`).
pub fn set_global_level(level: LogLevel) {
    GLOBAL_LEVEL.store(level as u8, core::sync::atomic::Ordering::Relaxed);
}

/// The current global verbosity ceiling.
#[must_use]
pub fn global_level() -> LogLevel {
    match GLOBAL_LEVEL.load(core::sync::atomic::Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Register an additional log sink.
pub fn add_sink(sink: Box<dyn LogSink>) {
    LOGGER.lock().sinks.push(sink);
}

/// Remove every registered sink. Intended for tests.
pub fn clear_sinks() {
    LOGGER.lock().sinks.clear();
}

/// Write a formatted message at the given level to all accepting sinks.
pub fn write_message(level: LogLevel, args: fmt::Arguments<'_>) {
    if level > global_level() {
        return;
    }
    let logger = LOGGER.lock();
    if logger.sinks.is_empty() {
        return;
    }

    struct SinkWriter<'a> {
        sink: &'a dyn LogSink,
    }

    impl fmt::Write for SinkWriter<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.sink.write_str(s);
            Ok(())
        }
    }

    for sink in &logger.sinks {
        if level <= sink.max_level() {
            let mut writer = SinkWriter {
                sink: sink.as_ref(),
            };
            let _ = write!(writer, "{}: {}\n", level.label(), args);
        }
    }
}

/// Write raw formatted text (no level prefix) to all sinks.
pub fn write_raw(args: fmt::Arguments<'_>) {
    let logger = LOGGER.lock();

    struct SinkWriter<'a> {
        sink: &'a dyn LogSink,
    }

    impl fmt::Write for SinkWriter<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.sink.write_str(s);
            Ok(())
        }
    }

    for sink in &logger.sinks {
        let mut writer = SinkWriter {
            sink: sink.as_ref(),
        };
        let _ = write!(writer, "{args}");
    }
}

/// Print raw text to all log sinks.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::log::write_raw(format_args!($($arg)*))
    };
}

/// Log at error level.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::log::write_message($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

/// Log at warning level.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::log::write_message($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// Log at info level.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::log::write_message($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

/// Log at debug level.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::log::write_message($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::{Arc, Mutex};

    struct CaptureSink {
        buf: Arc<Mutex<String>>,
        max: LogLevel,
    }

    impl LogSink for CaptureSink {
        fn write_str(&self, s: &str) {
            self.buf.lock().unwrap().push_str(s);
        }
        fn max_level(&self) -> LogLevel {
            self.max
        }
        fn name(&self) -> &str {
            "capture"
        }
    }

    #[test]
    fn messages_reach_accepting_sinks_only() {
        clear_sinks();
        let buf = Arc::new(Mutex::new(String::new()));
        add_sink(Box::new(CaptureSink {
            buf: buf.clone(),
            max: LogLevel::Warn,
        }));

        kwarn!("disk {} is slow", 2);
        kdebug!("should be filtered");

        let text = buf.lock().unwrap().clone();
        assert!(text.contains("WARN: disk 2 is slow"));
        assert!(!text.contains("filtered"));
        clear_sinks();
    }
}
