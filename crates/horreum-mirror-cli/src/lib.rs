use horreum_mirror_source::{HorreumClient, SourceError};
#[cfg(feature = "postgres")]
use horreum_mirror_store::PostgresSink;
use horreum_mirror_store::{Sink, SqliteSink, StoreError};
use horreum_mirror_types::RecordError;
use tracing::info;

mod cli;
mod config;
mod logging;
mod pipeline;

pub use cli::{Backend, Cli, Command, UploadArgs};
pub use config::{ConfigError, MirrorConfig, StoreConfig};
pub use logging::{APP_NAME, LogSink, Logging, LoggingConfig, LoggingError};
pub use pipeline::{DEFAULT_BATCH_SIZE, MirrorPipeline, MirrorReport};

pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("horreum: {0}")]
    Source(#[from] SourceError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("record: {0}")]
    Record(#[from] RecordError),
}

/// Runs one upload with production collaborators: the Horreum HTTP client and
/// the configured store backend.
pub fn run_mirror(config: &MirrorConfig) -> MirrorResult<MirrorReport> {
    config.validate()?;
    let client = HorreumClient::new(&config.horreum)?;
    let mut sink = open_sink(&config.store)?;
    info!(
        base_url = client.base_url(),
        test_id = config.query.test_id,
        "Mirroring datasets"
    );
    MirrorPipeline::new(&client, &mut *sink)
        .with_batch_size(config.batch_size)
        .run(config.query.clone())
}

pub fn open_sink(store: &StoreConfig) -> MirrorResult<Box<dyn Sink>> {
    match store {
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres(settings) => Ok(Box::new(PostgresSink::connect(settings)?)),
        StoreConfig::Sqlite { path } => Ok(Box::new(SqliteSink::open(path.clone())?)),
    }
}
