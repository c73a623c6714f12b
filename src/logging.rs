//! Logging setup for the binary and for applications embedding the client.
//!
//! Every record goes to stderr. When a directory is configured, records are also
//! written to `<name>.<date>.log`, rotated at midnight, keeping the five most
//! recent files. The database layer itself only emits `tracing` events and never
//! depends on this module.

use clap::ValueEnum;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Rotated files kept on disk.
pub const MAX_LOG_FILES: usize = 5;

/// Deployment tier. Decides the default level and how verbose each line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogTier {
    /// `info` and above, one compact line per event
    Production,
    /// `debug` and above, with source file and line
    #[default]
    Development,
}

impl LogTier {
    pub fn default_level(&self) -> &'static str {
        match self {
            Self::Production => "info",
            Self::Development => "debug",
        }
    }
}

impl std::fmt::Display for LogTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Used as the log file prefix
    pub name: String,
    pub tier: LogTier,
    /// Overrides the tier's default level; `RUST_LOG` overrides both
    pub level: Option<String>,
    pub json: bool,
    pub directory: Option<PathBuf>,
}

impl LogSettings {
    pub fn new(name: impl Into<String>, tier: LogTier) -> Self {
        Self {
            name: name.into(),
            tier,
            level: None,
            json: false,
            directory: None,
        }
    }

    /// Level directive used when `RUST_LOG` is absent.
    pub fn effective_level(&self) -> &str {
        self.level
            .as_deref()
            .unwrap_or_else(|| self.tier.default_level())
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to build rolling file appender: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

/// Keeps the background file writer alive. Dropping it flushes pending records.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Install the global subscriber described by `settings`.
pub fn init(settings: &LogSettings) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.effective_level()));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(settings)];

    let file_guard = match &settings.directory {
        Some(dir) => {
            let appender = file_appender(dir, &settings.name)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            layers.push(if settings.json {
                layer.json().boxed()
            } else {
                layer.with_target(true).boxed()
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LogGuard { _file: file_guard })
}

fn console_layer(settings: &LogSettings) -> BoxedLayer {
    let layer = fmt::layer().with_writer(std::io::stderr);
    if settings.json {
        return layer.json().boxed();
    }
    match settings.tier {
        LogTier::Production => layer.with_target(false).compact().boxed(),
        LogTier::Development => layer
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed(),
    }
}

/// Daily-rotated appender writing `<name>.<date>.log` under `dir`.
pub fn file_appender(dir: &Path, name: &str) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(dir)?;
    let appender = rolling::Builder::new()
        .filename_prefix(name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(appender)
}
