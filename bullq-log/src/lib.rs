//! Logging for the bullq job-queue client.
//!
//! A small env-driven logger shared by the bullq crates. Everything goes to
//! stderr so job output on stdout stays clean.
//!
//! # Usage
//!
//! ```rust
//! use bullq_log::{debug, info, warn, error};
//!
//! info!("Queue '{}' ready", "emails");
//! debug!(target: "bullq::worker", "Polling for jobs");
//! warn!("Redis reconnecting");
//! error!("Job {} failed", 42);
//! ```
//!
//! Failures that carry a `source()` chain should go through
//! [`report_error`], which prints every cause on its own line:
//!
//! ```rust
//! let err = std::io::Error::new(std::io::ErrorKind::Other, "socket reset");
//! bullq_log::report_error("bullq::worker", &err);
//! ```
//!
//! # Environment Variables
//!
//! - `BULLQ_DEBUG=1` - Enable debug logging
//! - `BULLQ_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `BULLQ_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `BULLQ_LOG_TIMESTAMPS=1|0` - Include timestamps

use once_cell::sync::Lazy;
use std::env;
use std::error::Error;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ============================================================================
// Levels and formats
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    /// Nothing is written
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable, one line per message plus indented causes
    Pretty,
    /// Short single-line format
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Global configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether to include timestamps
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Pretty,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Read the configuration from `BULLQ_*` environment variables and
    /// publish the level to the global filter.
    pub fn from_env() -> Self {
        let debug = env_flag("BULLQ_DEBUG").unwrap_or(false);

        let level = env::var("BULLQ_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("BULLQ_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Pretty);

        let timestamps = env_flag("BULLQ_LOG_TIMESTAMPS").unwrap_or(true);

        DEBUG_ENABLED.store(debug, Ordering::SeqCst);
        LOG_LEVEL.store(level as u8, Ordering::SeqCst);

        Self {
            debug,
            level,
            format,
            timestamps,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the logger eagerly. Otherwise the first log call does it.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[inline]
pub fn is_debug_enabled() -> bool {
    init();
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level at runtime.
///
/// The environment is read first, so a level set before the first log line
/// is not overwritten by it.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Enable or disable debug mode at runtime.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

/// Messages of `err` and every error in its `source()` chain, outermost first.
pub fn error_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    std::iter::successors(Some(err), |&e| e.source())
        .map(|e| e.to_string())
        .collect()
}

/// Write a failure and its whole cause chain to stderr.
///
/// Unlike the `error!` macro this is only silenced by `Level::Off`, so a
/// raised log level never hides an operator-visible failure.
pub fn report_error(target: &str, err: &(dyn Error + 'static)) {
    let mut stderr = std::io::stderr().lock();
    let _ = report_error_to(&mut stderr, target, err);
}

/// [`report_error`] into any writer.
pub fn report_error_to<W: Write>(
    out: &mut W,
    target: &str,
    err: &(dyn Error + 'static),
) -> std::io::Result<()> {
    let config = config();
    if current_level() == Level::Off {
        return Ok(());
    }

    write_report(out, target, &error_chain(err), config)
}

// ============================================================================
// Output
// ============================================================================

/// Log a message with the given level.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    if !is_level_enabled(level) {
        return;
    }

    let config = config();
    let mut stderr = std::io::stderr().lock();
    let _ = write_line(&mut stderr, level, target, message, config);
}

fn write_line<W: Write>(
    out: &mut W,
    level: Level,
    target: &str,
    message: &str,
    config: &LogConfig,
) -> std::io::Result<()> {
    match config.format {
        Format::Pretty => {
            if config.timestamps {
                let now = chrono::Local::now();
                write!(out, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;
            }
            write!(out, "{:5} ", level.as_str())?;
            if !target.is_empty() {
                write!(out, "[{}] ", target)?;
            }
            writeln!(out, "{}", message)
        }
        Format::Compact => {
            if config.timestamps {
                write!(out, "{} ", chrono::Local::now().format("%H:%M:%S"))?;
            }
            let initial = level.as_str().chars().next().unwrap_or('?');
            writeln!(out, "{} {}: {}", initial, target, message)
        }
        Format::Json => writeln!(out, "{}", json_line(level, target, message, &[])),
    }
}

fn write_report<W: Write>(
    out: &mut W,
    target: &str,
    chain: &[String],
    config: &LogConfig,
) -> std::io::Result<()> {
    let Some((message, causes)) = chain.split_first() else {
        return Ok(());
    };

    if config.format == Format::Json {
        return writeln!(out, "{}", json_line(Level::Error, target, message, causes));
    }

    write_line(out, Level::Error, target, message, config)?;
    for cause in causes {
        writeln!(out, "    caused by: {}", cause)?;
    }
    Ok(())
}

#[cfg(feature = "json")]
fn json_line(level: Level, target: &str, message: &str, causes: &[String]) -> String {
    use serde::Serialize;

    #[derive(Serialize)]
    struct LogEntry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
        #[serde(skip_serializing_if = "no_causes")]
        causes: &'a [String],
    }

    fn no_causes(causes: &&[String]) -> bool {
        causes.is_empty()
    }

    let entry = LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: level.as_str(),
        target,
        message,
        causes,
    };

    serde_json::to_string(&entry).unwrap_or_default()
}

#[cfg(not(feature = "json"))]
fn json_line(level: Level, target: &str, message: &str, causes: &[String]) -> String {
    let causes = causes
        .iter()
        .map(|c| format!("\"{}\"", escape_json(c)))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}","causes":[{}]}}"#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        escape_json(target),
        escape_json(message),
        causes
    )
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// Macros
// ============================================================================

/// Log a trace message.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a debug message.
///
/// Enabled by `BULLQ_DEBUG=1` or `BULLQ_LOG_LEVEL=debug`.
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, module_path!(), &format!($($arg)+));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum Outer {
        #[error("job 7 failed")]
        Job(#[source] Inner),
    }

    #[derive(Debug, thiserror::Error)]
    #[error("socket reset")]
    struct Inner;

    fn pretty_without_timestamps() -> LogConfig {
        LogConfig {
            timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse(" WARNING "), Some(Level::Warn));
        assert_eq!(Level::parse("none"), Some(Level::Off));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_error_chain_walks_sources() {
        let err = Outer::Job(Inner);
        assert_eq!(error_chain(&err), vec!["job 7 failed", "socket reset"]);
    }

    #[test]
    fn test_pretty_report_lists_causes() {
        let chain = error_chain(&Outer::Job(Inner));
        let mut out = Vec::new();
        write_report(&mut out, "bullq::worker", &chain, &pretty_without_timestamps()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "ERROR [bullq::worker] job 7 failed\n    caused by: socket reset\n"
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_report_is_one_object() {
        let chain = error_chain(&Outer::Job(Inner));
        let config = LogConfig {
            format: Format::Json,
            ..LogConfig::default()
        };
        let mut out = Vec::new();
        write_report(&mut out, "bullq::worker", &chain, &config).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["message"], "job 7 failed");
        assert_eq!(value["causes"][0], "socket reset");
    }

    #[test]
    fn test_compact_line() {
        let config = LogConfig {
            format: Format::Compact,
            timestamps: false,
            ..LogConfig::default()
        };
        let mut out = Vec::new();
        write_line(&mut out, Level::Warn, "bullq", "slow", &config).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "W bullq: slow\n");
    }

    #[test]
    fn test_runtime_level_survives_first_log_call() {
        set_level(Level::Error);
        assert!(!is_level_enabled(Level::Info));
        assert_eq!(current_level(), Level::Error);

        set_debug(true);
        assert!(is_debug_enabled());
        assert_eq!(current_level(), Level::Debug);

        set_debug(false);
        set_level(Level::Info);
    }

    #[test]
    fn test_report_error_to_writer() {
        let mut out = Vec::new();
        report_error_to(&mut out, "bullq::worker", &Outer::Job(Inner)).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("job 7 failed"));
        assert!(text.contains("socket reset"));
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!is_level_enabled(Level::Off));
    }

    #[test]
    fn test_macros_compile() {
        trace!("trace message");
        debug!("debug message");
        info!("info message");
        warn!("warn message");
        error!("error message");

        info!(target: "test", "with target {}", 1);
    }
}
