//! Tracing subscriber setup and the lifecycle events every stage binary emits.

use std::time::Instant;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Output shape of the stderr log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event.
    Compact,
    /// Multi-line, human oriented.
    Pretty,
    /// One JSON object per line with event fields at the top level.
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging knobs; loaded together with the rest of [`crate::PipelineConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `demand311=debug,warn`.
    pub filter: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingInitError> {
        EnvFilter::try_new(&self.filter).map_err(|source| LoggingInitError::InvalidFilter {
            filter: self.filter.clone(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: ParseError,
    },
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the process-wide subscriber writing to stderr; stdout stays free
/// for the stage summary.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.include_target)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().with_ansi(false).finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder.json().flatten_event(true).with_ansi(false).finish(),
        )?,
    }

    Ok(())
}

/// One stage invocation: `stage.start` when created, `stage.finish` with the
/// elapsed wall time when finished.
#[derive(Debug)]
#[must_use = "call `finish` once the stage has written its output"]
pub struct StageRun {
    stage: &'static str,
    started: Instant,
}

impl StageRun {
    pub fn start(stage: &'static str, logging: &LoggingConfig) -> Self {
        info!(
            component = "pipeline",
            event = "stage.start",
            stage,
            log_filter = %logging.filter,
            log_format = logging.format.as_str()
        );
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn finish(self, rows_out: usize) {
        info!(
            component = "pipeline",
            event = "stage.finish",
            stage = self.stage,
            rows_out,
            elapsed_ms = self.started.elapsed().as_millis() as u64
        );
    }
}
