use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human-readable, multi-line
    Pretty,
}

impl LogFormat {
    pub fn parse(format: &str) -> anyhow::Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(anyhow::anyhow!("Invalid log format: {format}")),
        }
    }
}

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` overrides the configured level. Logs go to stderr unless a
/// file path is set, in which case they are appended to that file.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let log_level = parse_log_level(&config.level)?;
    let format = LogFormat::parse(&config.format)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let file = config
        .file_path
        .as_ref()
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()?
        .map(Arc::new);

    match (format, file) {
        (LogFormat::Json, Some(file)) => registry.with(json_layer().with_writer(file)).try_init()?,
        (LogFormat::Json, None) => registry
            .with(json_layer().with_writer(std::io::stderr))
            .try_init()?,
        (LogFormat::Pretty, Some(file)) => registry
            .with(pretty_layer().with_ansi(false).with_writer(file))
            .try_init()?,
        (LogFormat::Pretty, None) => registry
            .with(pretty_layer().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}

fn json_layer<S>() -> fmt::Layer<S, fmt::format::JsonFields, fmt::format::Format<fmt::format::Json>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
}

fn pretty_layer<S>() -> fmt::Layer<S, fmt::format::Pretty, fmt::format::Format<fmt::format::Pretty>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .pretty()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_line_number(true)
        .with_file(false)
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

/// Generate a random id used to tag one playback session's log lines
#[must_use]
pub fn generate_trace_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let trace_id: u128 = rng.gen();
    format!("{trace_id:032x}")
}
