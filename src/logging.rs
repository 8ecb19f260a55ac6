//! Structured logging shared by the automation strategies and adapters.
//!
//! Strategy code logs which tier of a cascade fired and why, tagged with the
//! service it was driving; those records matter when a site ships a DOM
//! change and a fallback silently takes over.  External sinks can subscribe
//! via a callback while a console printer stays the default.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LoggerCallback, Verbosity};

/// Convenience alias for external logging callbacks.
pub type LogCallback = Arc<dyn Fn(&ChorusLogRecord) + Send + Sync + 'static>;

/// High-level logging configuration shared across the chorus runtime.
#[derive(Clone)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub use_rich: bool,
    pub external_logger: Option<LogCallback>,
    pub quiet_dependencies: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: Verbosity::Medium,
            use_rich: true,
            external_logger: None,
            quiet_dependencies: true,
        }
    }
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level == LogLevel::Error || level.as_u8() <= verbosity_to_u8(self.verbose)
    }
}

/// Log severity used across chorus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl From<u8> for LogLevel {
    fn from(value: u8) -> Self {
        match value {
            0 => LogLevel::Error,
            2 => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

fn verbosity_to_u8(verbose: Verbosity) -> u8 {
    match verbose {
        Verbosity::Minimal => 0,
        Verbosity::Medium => 1,
        Verbosity::Detailed => 2,
    }
}

/// Structured log entry shared with external callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChorusLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    /// Service or component the record belongs to (`chatgpt`, `runtime`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl ChorusLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }
}

/// Default console printer used when no external logger is configured.
pub fn default_log_handler(record: &ChorusLogRecord) {
    let timestamp = record
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    if let Some(category) = &record.category {
        println!(
            "[{}] {:<5} [{}] {}",
            timestamp,
            record.level.label(),
            category,
            record.message
        );
    } else {
        println!(
            "[{}] {:<5} {}",
            timestamp,
            record.level.label(),
            record.message
        );
    }
    if let Some(aux) = &record.auxiliary {
        if !aux.is_null() {
            println!("    {}", aux);
        }
    }
}

/// Adapt a plain string callback (the shape [`crate::config::ChorusConfig`]
/// carries) into a structured sink.
pub fn callback_from_string_logger(logger: LoggerCallback) -> LogCallback {
    Arc::new(move |record: &ChorusLogRecord| {
        let line = match &record.category {
            Some(category) => format!("[{}] {}", category, record.message),
            None => record.message.clone(),
        };
        logger(&line);
    })
}

/// Logger used by every component that talks to a page.
pub struct ChorusLogger {
    config: LogConfig,
    default_handler: LogCallback,
}

impl fmt::Debug for ChorusLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusLogger")
            .field("verbosity", &self.config.verbose)
            .field("use_rich", &self.config.use_rich)
            .field("external_logger", &self.config.external_logger.is_some())
            .finish()
    }
}

impl ChorusLogger {
    pub fn with_config(config: LogConfig) -> Self {
        Self {
            config,
            default_handler: Arc::new(default_log_handler),
        }
    }

    pub fn new(verbose: Verbosity) -> Self {
        Self::with_config(LogConfig::new(verbose))
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn set_verbose(&mut self, verbose: Verbosity) {
        self.config.verbose = verbose;
    }

    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.config.external_logger = logger;
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.config.should_log(level) {
            return;
        }

        let record =
            ChorusLogRecord::new(message, level, category.map(|c| c.to_string()), auxiliary);

        if let Some(callback) = &self.config.external_logger {
            callback(&record);
        } else {
            (self.default_handler)(&record);
        }
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn info(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn respects_verbosity() {
        let logger = ChorusLogger::new(Verbosity::Minimal);
        assert!(logger.config.should_log(LogLevel::Error));
        assert!(!logger.config.should_log(LogLevel::Debug));
    }

    #[test]
    fn external_logger_is_invoked() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let callback: LogCallback = Arc::new(move |record| {
            capture.lock().unwrap().push(record.clone());
        });

        let mut config = LogConfig::default();
        config.verbose = Verbosity::Detailed;
        config.external_logger = Some(callback);
        let logger = ChorusLogger::with_config(config);

        logger.info("located send button", Some("claude"), None);

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].message, "located send button");
        assert_eq!(values[0].category.as_deref(), Some("claude"));
        assert_eq!(values[0].level, LogLevel::Info);
    }

    #[test]
    fn string_logger_bridge_prefixes_the_category() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&lines);
        let string_logger: LoggerCallback = Arc::new(move |line: &str| {
            capture.lock().unwrap().push(line.to_string());
        });

        let mut logger = ChorusLogger::new(Verbosity::Detailed);
        logger.set_external_logger(Some(callback_from_string_logger(string_logger)));

        logger.debug("injection strategy 2 accepted", Some("gemini"), None);
        logger.info("no category", None, None);

        let values = lines.lock().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "[gemini] injection strategy 2 accepted");
        assert_eq!(values[1], "no category");
    }
}
