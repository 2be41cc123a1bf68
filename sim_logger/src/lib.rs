//! # Logger
//!
//! This crate implements structured logging for the simulator units.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! Call sites use the `log` macros; this crate turns each record into a
//! [`LogEntry`] and renders it as `<module> <LEVEL> [target] message`.

use log::{LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-instruction and per-frame detail
    Trace,
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl LogLevel {
    /// Filter accepting this level and everything more severe
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => LogLevel::Trace,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Info => LogLevel::Info,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Error => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the logger
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoggerError {
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("A logger is already installed")]
    AlreadyInstalled,
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LoggerError::UnknownLevel(raw.to_string())),
        }
    }
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Unit that produced the entry (`kernel`, `cpu`, `memory`)
    pub module: String,
    /// Rust module path of the call site
    pub target: String,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, message: String) -> Self {
        Self {
            level,
            module: String::new(),
            target: String::new(),
            message,
            fields: Vec::new(),
        }
    }

    /// Sets the producing unit
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Sets the call-site target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: String, value: String) -> Self {
        self.fields.push((key, value));
        self
    }

    /// Renders the entry as a single line
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} {} [{}] {}",
            self.module, self.level, self.target, self.message
        );
        for (key, value) in &self.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        line
    }
}

/// Shared buffer of captured entries
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    /// Returns a copy of every captured entry
    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns true if any captured message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    fn push(&self, entry: LogEntry) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    Memory(MemoryLog),
}

/// `log` backend for one simulator unit
#[derive(Debug)]
pub struct Logger {
    module: String,
    level: LogLevel,
    sink: Sink,
}

impl Logger {
    /// Creates a logger writing to stderr
    pub fn stderr(module: impl Into<String>, level: LogLevel) -> Self {
        Self {
            module: module.into(),
            level,
            sink: Sink::Stderr,
        }
    }

    /// Creates a logger capturing entries in memory
    pub fn memory(module: impl Into<String>, level: LogLevel) -> (Self, MemoryLog) {
        let log = MemoryLog::default();
        let logger = Self {
            module: module.into(),
            level,
            sink: Sink::Memory(log.clone()),
        };
        (logger, log)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn entry_for(&self, record: &Record<'_>) -> LogEntry {
        LogEntry::new(record.level().into(), record.args().to_string())
            .with_module(self.module.clone())
            .with_target(record.target())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        LogLevel::from(metadata.level()) >= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = self.entry_for(record);
        match &self.sink {
            Sink::Stderr => {
                let mut stderr = std::io::stderr().lock();
                let _ = writeln!(stderr, "{}", entry.render());
            }
            Sink::Memory(log) => log.push(entry),
        }
    }

    fn flush(&self) {
        if let Sink::Stderr = self.sink {
            let _ = std::io::stderr().flush();
        }
    }
}

/// Installs a stderr logger for this process
///
/// Can be called once per process; later calls fail with
/// [`LoggerError::AlreadyInstalled`].
pub fn init(module: &str, level: LogLevel) -> Result<(), LoggerError> {
    install(Logger::stderr(module, level))
}

/// Installs an arbitrary logger for this process
pub fn install(logger: Logger) -> Result<(), LoggerError> {
    let filter = logger.level().to_filter();
    log::set_boxed_logger(Box::new(logger)).map_err(|_| LoggerError::AlreadyInstalled)?;
    log::set_max_level(filter);
    Ok(())
}
