//! Logging infrastructure for the bridge
//!
//! Structured logging through `tracing`, with support for multiple output formats and
//! destinations. The native side keeps its own logger; [`native_level_name`] derives the level
//! name forwarded to it in configuration blobs.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable holding filter directives, checked before `RUST_LOG`
pub const LOG_ENV: &str = "MLFLOW_BRIDGE_LOG";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact format for production
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Whether to include span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g., "mlflow_bridge::proxy=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Initialize the global logging system
///
/// Returns the `WorkerGuard` of the non-blocking writer; keep it alive until exit so buffered
/// records are flushed. A second call leaves the first subscriber in place.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    match &config.output {
        LogOutput::Stdout => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            install(writer, &config);
            Some(guard)
        }
        LogOutput::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            install(writer, &config);
            Some(guard)
        }
        LogOutput::File { directory, prefix } => {
            let file_appender = rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            install(writer, &config);
            Some(guard)
        }
    }
}

fn install<W>(writer: W, config: &LogConfig)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = build_filter(config);
    let span_events = span_events_config(config.span_events);

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .pretty()
            .with_span_events(span_events)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .compact()
            .with_span_events(span_events)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(span_events)
            .with_filter(filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(""))
        .add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str
            .split(',')
            .filter(|directive| !directive.trim().is_empty())
            .fold(base_filter, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    tracing::warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Initialize logging for the command-line binary
pub fn init_cli_logging(level: Level) -> Option<WorkerGuard> {
    init_logging(LogConfig::new().with_level(level))
}

/// Initialize JSON logging into a rotating file for long-running servers
pub fn init_file_logging(log_dir: impl AsRef<Path>, level: Level) -> Option<WorkerGuard> {
    init_logging(file_log_config(log_dir.as_ref(), level))
}

fn file_log_config(log_dir: &Path, level: Level) -> LogConfig {
    LogConfig {
        level,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.to_string_lossy().to_string(),
            prefix: "mlflow-bridge".to_string(),
        },
        span_events: false,
        filter: None,
    }
}

/// Parse a level name as accepted by the native side (`warning` is an alias of `warn`)
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "fatal" | "panic" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

/// Level name for the `log_level` key of a configuration blob
pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Level name matching the most verbose level currently enabled in this process
pub fn native_level_name() -> &'static str {
    match LevelFilter::current().into_level() {
        Some(level) => level_name(level),
        None => "ERROR",
    }
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::trace;

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
            trace!(
                operation = %self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
