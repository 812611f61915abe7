//! Logging configuration and initialization
//!
//! Both pipeline services log through `tracing`. Output defaults to JSON lines
//! on stdout so container log collectors can index the structured fields
//! (`record_id`, `topic`, `offset`, ...). A daily rolling file can be added
//! alongside or instead of the console.
//!
//! Environment variables:
//! - `LOG_LEVEL`: trace, debug, info, warn, error
//! - `LOG_OUTPUT`: console, file, both
//! - `LOG_FORMAT`: text, json
//! - `LOG_DIR`: directory for rolling log files
//! - `LOG_FILE_PREFIX`: file name prefix (`ketl-processor` -> `ketl-processor.2024-01-18`)
//! - `LOG_FILTER`: extra directives, e.g. `rdkafka=warn,sqlx=info`
//!
//! # Example
//!
//! ```no_run
//! use ketl_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::for_service("ketl-extractor", "ketl_extractor=debug,tower_http=info")
//!     .with_env()
//!     .expect("invalid LOG_* variable");
//! init_logging(&config).expect("logging");
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "console" | "stdout" => LogOutput::Console,
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            other => bail!("LOG_OUTPUT must be console, file or both, got '{other}'"),
        })
    }
}

/// Line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Text,
    #[default]
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => bail!("LOG_FORMAT must be text or json, got '{other}'"),
        })
    }
}

/// Logging setup for one service
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub output: LogOutput,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    /// Per-target directives, comma separated
    pub directives: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_service("ketl", "")
    }
}

impl LogConfig {
    /// JSON console logging at `info`, with the service's own directives
    pub fn for_service(name: &str, directives: &str) -> Self {
        Self {
            level: LevelFilter::INFO,
            output: LogOutput::default(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: name.to_string(),
            directives: directives.to_string(),
        }
    }

    /// Apply `LOG_*` overrides from the environment
    pub fn with_env(mut self) -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(level) = var("LOG_LEVEL") {
            self.level = level
                .parse()
                .with_context(|| format!("LOG_LEVEL '{level}' is not a level"))?;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(extra) = var("LOG_FILTER") {
            self.directives = [self.directives.as_str(), extra.as_str()]
                .into_iter()
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
                .join(",");
        }

        Ok(self)
    }

    /// Defaults with `LOG_*` overrides
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        self.directives
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .try_fold(EnvFilter::from_default_env().add_directive(self.level.into()), |filter, d| {
                let directive = d
                    .parse()
                    .with_context(|| format!("Invalid log filter directive '{d}'"))?;
                Ok(filter.add_directive(directive))
            })
    }
}

type ServiceLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn service_layer<W>(format: LogFormat, writer: W, ansi: bool) -> ServiceLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true);

    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    }
}

/// Install the global tracing subscriber
///
/// Call once at startup; a second call returns an error.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let mut layers: Vec<ServiceLayer> = Vec::new();

    if matches!(config.output, LogOutput::Console | LogOutput::Both) {
        let ansi = config.format == LogFormat::Text;
        layers.push(service_layer(config.format, std::io::stdout, ansi));
    }

    if matches!(config.output, LogOutput::File | LogOutput::Both) {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // flushes on drop; kept for the life of the process
        std::mem::forget(guard);
        layers.push(service_layer(config.format, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter()?)
        .try_init()
        .context("Failed to install tracing subscriber")
}
