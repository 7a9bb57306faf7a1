use std::path::PathBuf;

use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const APP_NAME: &str = "horreum-mirror";

/// Libraries whose own logs are capped at WARN so they do not drown ours.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "postgres", "tokio_postgres"];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("cannot open log file in {directory}: {message}")]
    File { directory: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    /// Daily-rotated `horreum-mirror.<date>.log` files, keeping `max_files` of them.
    File { directory: PathBuf, max_files: usize },
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Threshold for the stderr sink.
    pub level: LevelFilter,
    /// Threshold for file sinks.
    pub file_level: LevelFilter,
    pub sinks: Vec<LogSink>,
}

impl LoggingConfig {
    /// Stderr at `level` plus a DEBUG log file in the system temp directory.
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            file_level: LevelFilter::DEBUG,
            sinks: vec![
                LogSink::Stderr,
                LogSink::File {
                    directory: std::env::temp_dir(),
                    max_files: 3,
                },
            ],
        }
    }

    pub fn stderr_only(level: LevelFilter) -> Self {
        Self {
            sinks: vec![LogSink::Stderr],
            ..Self::new(level)
        }
    }

    pub fn build(&self) -> Result<Logging, LoggingError> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        let mut guards = Vec::new();
        for sink in &self.sinks {
            match sink {
                LogSink::Stderr => {
                    let layer = fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_thread_names(true)
                        .with_filter(level_filter(self.level)?)
                        .boxed();
                    layers.push(layer);
                }
                LogSink::File {
                    directory,
                    max_files,
                } => {
                    let appender = RollingBuilder::new()
                        .rotation(Rotation::DAILY)
                        .filename_prefix(APP_NAME)
                        .filename_suffix("log")
                        .max_log_files((*max_files).max(1))
                        .build(directory)
                        .map_err(|err| LoggingError::File {
                            directory: directory.clone(),
                            message: err.to_string(),
                        })?;
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    guards.push(guard);
                    let layer = fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_thread_names(true)
                        .with_filter(level_filter(self.file_level)?)
                        .boxed();
                    layers.push(layer);
                }
            }
        }
        let subscriber = Registry::default().with(layers);
        Ok(Logging {
            dispatch: Dispatch::new(subscriber),
            _guards: guards,
        })
    }
}

fn level_filter(level: LevelFilter) -> Result<EnvFilter, LoggingError> {
    let noisy = level.min(LevelFilter::WARN);
    // Global level first; per-target caps override it for their targets.
    let directives = std::iter::once(level.to_string())
        .chain(
            NOISY_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, noisy)),
        )
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::builder()
        .parse(directives)
        .map_err(|err| LoggingError::Filter(err.to_string()))
}

/// A built subscriber plus the guards that flush its background writers.
///
/// Events are only recorded inside [`Logging::in_scope`]; dropping the value
/// flushes any pending file output.
pub struct Logging {
    dispatch: Dispatch,
    _guards: Vec<WorkerGuard>,
}

impl Logging {
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}
