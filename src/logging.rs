//! Logging infrastructure - structured tracing for the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels (environment or `BridgeConfig`)
//! - Zero-cost when disabled
//! - Optional JSON output and file output through `tracing-appender`
//!
//! The bridge itself only emits events; installing a subscriber is the
//! embedder's choice.

use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn, Level};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; console (stderr) output when absent
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DYNABIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("DYNABIND_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        if let Ok(path) = std::env::var("DYNABIND_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("DYNABIND_LOG_JSON").is_ok();
        config.show_spans = std::env::var("DYNABIND_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for debugging marshalling problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

/// Parse a level name as used in config files and the environment
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Initialize logging with custom configuration
///
/// Idempotent: only the first call installs a subscriber. File output
/// returns a `WorkerGuard` that must outlive all logging.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    if LOGGER_INITIALIZED.set(()).is_err() {
        return None;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dynabind={}", config.level.as_str().to_lowercase())));

    let span_events = if config.show_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (writer, guard) = match &config.log_path {
        Some(path) => {
            let path = Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "dynabind.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    // Another subscriber may already be installed by the embedder.
    let _ = tracing_subscriber::registry().with(env_filter).with(layer).try_init();
    guard
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a native call about to be dispatched
#[inline]
pub fn log_call(function: &str, slots: usize) {
    debug!(target: "dynabind::invoke", function, slots, "native call");
}

/// Log a native call return
#[inline]
pub fn log_call_return(function: &str, results: usize) {
    trace!(target: "dynabind::invoke", function, results, "native call returned");
}

/// Log a native call that reported a domain error
#[inline]
pub fn log_call_failure(function: &str, message: &str, code: i32) {
    debug!(target: "dynabind::invoke", function, message, code, "native call failed");
}

/// Log creation of a compound wrapper
#[inline]
pub fn log_wrapper_created(type_name: &str, address: *const u8, owns: bool) {
    trace!(target: "dynabind::compound", type_name, address = ?address, owns, "wrapper created");
}

/// Log finalization of a compound wrapper
#[inline]
pub fn log_wrapper_finalized(address: *const u8, owns: bool) {
    trace!(target: "dynabind::compound", address = ?address, owns, "wrapper finalized");
}

/// Log a state that should be impossible; finalization continues
#[inline]
pub fn log_consistency_violation(what: &str, address: *const u8) {
    warn!(target: "dynabind::compound", what, address = ?address, "consistency violation");
}

/// Log a type conversion
#[inline]
pub fn log_type_conversion(from: &str, to: &str) {
    trace!(target: "dynabind::marshal", from, to, "type conversion");
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &str) -> PerformanceGuard {
        PerformanceGuard {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: String,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = %self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_idempotent() {
        let _ = init_with_config(LogConfig::default());
        assert!(init_with_config(LogConfig::debug()).is_none());
        assert!(is_initialized());
    }

    #[test]
    fn test_logging_functions() {
        log_call("test_function", 3);
        log_call_return("test_function", 1);
        log_call_failure("test_function", "bad", 7);
        log_wrapper_created("Demo.Point", std::ptr::null(), true);
        log_wrapper_finalized(std::ptr::null(), false);
        log_type_conversion("int32", "integer");
        let _guard = perf::track("noop");
    }
}
