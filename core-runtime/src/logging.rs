//! # Logging & Tracing Infrastructure
//!
//! Installs the global `tracing` subscriber for the core:
//! - one stdout layer in pretty, JSON or compact form
//! - an `EnvFilter` giving every workspace crate the configured level and
//!   keeping HTTP/database internals at `warn`
//! - optional mirroring of each event into a host [`LoggerSink`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! tracing::info!("Player started");
//! ```
//!
//! ## What never reaches a log line
//!
//! Stream URLs carry Subsonic credentials in their query (`t`, `s`, `p`), and
//! file paths carry the user's home directory. Call sites pass URLs through
//! [`redact_if_sensitive`] and paths through [`strip_path`]; the sink layer
//! applies [`redact_if_sensitive`] to every field when
//! [`LoggingConfig::redact_pii`] is set.

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

const WORKSPACE_TARGETS: &[&str] = &[
    "musicboom_workspace",
    "core_runtime",
    "core_library",
    "core_playback",
    "core_download",
    "core_service",
    "provider_navidrome",
    "bridge_desktop",
];

const QUIET_DEPENDENCIES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls", "sqlx"];

/// Subsonic query parameters holding credentials
const CREDENTIAL_PARAMS: &[&str] = &["t", "s", "p"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; the debug-build default
    Pretty,
    /// One JSON object per line; the release-build default
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates when no custom filter is given
    pub level: LogLevel,
    /// Full `EnvFilter` directive string, replacing the default one
    pub filter: Option<String>,
    /// Mask credential-like values handed to the logger sink
    pub redact_pii: bool,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close in the pretty format and span context in JSON
    pub show_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            redact_pii: true,
            logger_sink: None,
            show_spans: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("redact_pii", &self.redact_pii)
            .field("logger_sink", &self.logger_sink.is_some())
            .field("show_spans", &self.show_spans)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_pii_redaction(mut self, redact: bool) -> Self {
        self.redact_pii = redact;
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, show: bool) -> Self {
        self.show_spans = show;
        self
    }

    /// The `EnvFilter` directives this config resolves to
    pub fn directives(&self) -> String {
        if let Some(custom) = &self.filter {
            return custom.clone();
        }
        let level = self.level.as_str();
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .chain(QUIET_DEPENDENCIES.iter().map(|dep| format!("{}=warn", dep)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber.
///
/// Call once during startup. A second call fails with [`Error::Config`]
/// because the global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(stdout_layer(&config))
        .with(SinkLayer::new(config.logger_sink.clone(), config.redact_pii))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn stdout_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.show_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(spans)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.show_spans)
            .with_span_list(false)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stdout)
            .boxed(),
    }
}

// ============================================================================
// Host sink
// ============================================================================

/// Mirrors events into a [`LoggerSink`].
struct SinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl SinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn entry_for<S>(&self, event: &Event<'_>, level: LogLevel, ctx: &Context<'_, S>) -> LogEntry
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (key, value) in fields.values {
            let value = if self.redact {
                redact_if_sensitive(&key, &value)
            } else {
                value
            };
            entry = entry.with_field(key, value);
        }
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span(span.name());
        }
        entry
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let level = log_level(*event.metadata().level());
        if level < sink.min_level() {
            return;
        }

        let entry = self.entry_for(event, level, &ctx);
        let sink = Arc::clone(sink);

        // Inside the runtime the sink must not block the emitting task.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

// ============================================================================
// Redaction helpers
// ============================================================================

/// Mask a value that is, or embeds, a credential.
///
/// - fields named like `token`, `password`, `salt`, `secret`, `authorization`
///   are replaced entirely
/// - URLs keep their path but lose the `t`, `s` and `p` query values
/// - e-mail addresses keep their first character only
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(url = %redact_if_sensitive("url", &stream_url), "Filling cache");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &["token", "password", "salt", "secret", "authorization", "bearer"];

    let field = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|name| field.contains(name)) {
        return REDACTED.to_string();
    }

    if let Some((base, query)) = value.split_once('?') {
        if base.contains("://") {
            return format!("{}?{}", base, redact_query(query));
        }
    }

    match value.find('@') {
        Some(at) if !value.contains(' ') && value[at..].contains('.') => {
            let first = value.chars().next().filter(|_| at > 0);
            format!("{}***@{}", first.map(String::from).unwrap_or_default(), REDACTED)
        }
        _ => value.to_string(),
    }
}

fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if CREDENTIAL_PARAMS.contains(&key) => format!("{}={}", key, REDACTED),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Reduce a file path to its basename
///
/// ```ignore
/// use core_runtime::logging::strip_path;
///
/// tracing::info!(file = %strip_path("/home/ana/Music/song.mp3"), "Imported");
/// // file="song.mp3"
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
