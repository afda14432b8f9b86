//! Unit tests for engine.rs
//!
//! The logger is global state: every test is #[serial].

use std::sync::{Arc, Mutex};
use serial_test::serial;
use crate::engine::Engine;
use crate::error::Error;
use crate::log::{Logger, LogEntry, LogSeverity};

struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn install_test_logger() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    entries
}

#[test]
#[serial]
fn test_custom_logger_receives_macro_output() {
    let entries = install_test_logger();

    crate::engine_info!("ember::test", "loaded {} scenes", 2);
    crate::engine_warn!("ember::test", "careful");

    let entries = entries.lock().unwrap().clone();
    Engine::reset_logger();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, LogSeverity::Info);
    assert_eq!(entries[0].message, "loaded 2 scenes");
    assert_eq!(entries[0].source, "ember::test");
    assert!(entries[0].file.is_none());
    assert_eq!(entries[1].severity, LogSeverity::Warn);
}

#[test]
#[serial]
fn test_engine_error_carries_location() {
    let entries = install_test_logger();

    crate::engine_error!("ember::test", "boom");

    let entries = entries.lock().unwrap().clone();
    Engine::reset_logger();

    assert_eq!(entries.len(), 1);
    assert!(entries[0].file.is_some());
    assert!(entries[0].line.is_some());
}

#[test]
#[serial]
fn test_engine_err_logs_and_builds_backend_error() {
    let entries = install_test_logger();

    let err = crate::engine_err!("ember::test", "vkCreateFence: {}", -1);

    let entries = entries.lock().unwrap().clone();
    Engine::reset_logger();

    assert_eq!(err, Error::BackendError("vkCreateFence: -1".to_string()));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    fn fails() -> crate::error::Result<u32> {
        crate::engine_bail!("ember::test", "nope");
    }
    let entries = install_test_logger();
    let result = fails();
    Engine::reset_logger();

    assert!(matches!(result, Err(Error::BackendError(msg)) if msg == "nope"));
    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_log_and_return_error_reports_once() {
    let entries = install_test_logger();

    let err = Engine::log_and_return_error("ember::test", Error::DescriptorPoolExhausted);

    let entries = entries.lock().unwrap().clone();
    Engine::reset_logger();

    assert_eq!(err, Error::DescriptorPoolExhausted);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Descriptor pool exhausted");
}

#[test]
#[serial]
fn test_log_level_drops_lower_severities() {
    let entries = install_test_logger();
    Engine::set_log_level(LogSeverity::Warn);

    crate::engine_info!("ember::test", "hidden");
    crate::engine_debug!("ember::test", "hidden");
    crate::engine_warn!("ember::test", "shown");
    crate::engine_error!("ember::test", "shown");

    let level = Engine::log_level();
    Engine::set_log_level(LogSeverity::Trace);
    let entries = entries.lock().unwrap().clone();
    Engine::reset_logger();

    assert_eq!(level, LogSeverity::Warn);
    let severities: Vec<LogSeverity> = entries.iter().map(|e| e.severity).collect();
    assert_eq!(severities, vec![LogSeverity::Warn, LogSeverity::Error]);
}
