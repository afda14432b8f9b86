/// Ember Engine - global logging facade
///
/// Holds the process-wide logger behind a `RwLock` so every subsystem (and
/// the Vulkan backend) can report through the `engine_*` macros without
/// threading a logger handle around.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::error::Error;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger on first use)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())))
}

/// Entries below this severity are dropped before reaching the logger
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogSeverity::Trace as u8);

fn enabled(severity: LogSeverity) -> bool {
    severity as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

// ===== PUBLIC API =====

/// Engine-wide services that are not tied to a device or a scene
pub struct Engine;

impl Engine {
    /// Log a structured error at its origin and hand it back
    ///
    /// Used for the typed compile/resource errors so that every fatal error
    /// is reported once with its names attached.
    pub(crate) fn log_and_return_error(source: &str, error: Error) -> Error {
        Self::log(LogSeverity::Error, source, error.to_string());
        error
    }

    /// Replace the current logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ember_engine::ember::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct Silent;
    /// impl Logger for Silent {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(Silent);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(logger_impl);
        }
    }

    /// Restore the colored console logger
    pub fn reset_logger() {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(DefaultLogger::default());
        }
    }

    /// Set the minimum severity forwarded to the logger
    ///
    /// `Runtime::new` applies `Config::log_level` through this.
    pub fn set_log_level(level: LogSeverity) {
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }

    pub fn log_level() -> LogSeverity {
        match LOG_LEVEL.load(Ordering::Relaxed) {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Debug,
            2 => LogSeverity::Info,
            3 => LogSeverity::Warn,
            _ => LogSeverity::Error,
        }
    }

    /// Emit an entry without source location (used by engine_info!, engine_warn!, ...)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if !enabled(severity) {
            return;
        }
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Emit an entry with file:line (used by engine_error! and engine_err!)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if !enabled(severity) {
            return;
        }
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
