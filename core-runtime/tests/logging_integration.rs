//! Integration tests for the logging system.
//!
//! `init_logging` installs a process-wide subscriber, so only one test in this
//! binary initializes it.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_init_logging_forwards_to_sink_and_rejects_second_init() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::warn!(
        target: "core_sync::scheduler",
        unique_name = "sync_library",
        api_key = "k-123",
        "Background sync scheduled after failure"
    );
    tracing::debug!(target: "sqlx::query", "filtered out by the default filter");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(
            entries[0].fields.get("unique_name"),
            Some(&"sync_library".to_string())
        );
        assert_eq!(entries[0].fields.get("api_key"), Some(&"[REDACTED]".to_string()));
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_pii_redaction_credentials() {
    assert_eq!(redact_if_sensitive("access_token", "eyJhbGci"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("session_id", "2f1c"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("username", "viewer@example.com");

    assert!(redacted.starts_with('v'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("media_id", "603"), "603");
    assert_eq!(redact_if_sensitive("media_type", "movie"), "movie");
    assert_eq!(redact_if_sensitive("account_id", "42"), "42");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/lib/media/library.db"), "library.db");
    assert_eq!(strip_path("D:\\data\\library.db"), "library.db");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
