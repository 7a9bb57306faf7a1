use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use horreum_mirror_source::{DEFAULT_BASE_URL, HorreumConfig, ListQuery, TlsVerification};
#[cfg(feature = "postgres")]
use horreum_mirror_store::PostgresSettings;
use tracing::level_filters::LevelFilter;

use crate::config::{ConfigError, MirrorConfig, StoreConfig};
use crate::logging::{LogSink, LoggingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "horreum-mirror",
    version,
    about = "Utility to mirror data from Horreum to PostgreSQL"
)]
pub struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Show debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
    /// Directory for the rotating debug log
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,
    /// Only log to stderr
    #[arg(long, global = true)]
    pub no_log_file: bool,

    /// Base URL of Horreum server
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub horreum_base_url: String,
    /// Horreum API token
    #[arg(long, env = "HORREUM_API_TOKEN", hide_env_values = true)]
    pub horreum_api_token: Option<String>,
    /// Accept any server certificate from Horreum. Only for trusted networks.
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Where mirrored rows are written
    #[arg(long, value_enum, default_value_t = Backend::Postgres)]
    pub backend: Backend,
    /// PostgreSQL server host
    #[arg(long)]
    pub postgresql_host: Option<String>,
    /// PostgreSQL server port
    #[arg(long, default_value_t = 5432)]
    pub postgresql_port: u16,
    /// PostgreSQL username
    #[arg(long)]
    pub postgresql_user: Option<String>,
    /// PostgreSQL password
    #[arg(long, env = "POSTGRESQL_PASS", hide_env_values = true)]
    pub postgresql_pass: Option<String>,
    /// PostgreSQL database
    #[arg(long)]
    pub postgresql_db: Option<String>,
    /// SQLite database file, used with `--backend sqlite`
    #[arg(long, value_name = "FILE")]
    pub sqlite_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Postgres,
    Sqlite,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror data from Horreum to PostgreSQL
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Test ID from Horreum
    #[arg(long)]
    pub horreum_test_id: i32,
    /// How many datasets to process
    #[arg(long, default_value_t = 100)]
    pub horreum_count: usize,
    /// How many newest datasets to load on one page
    #[arg(long, default_value_t = 10)]
    pub horreum_limit: u32,
    /// From what page of datasets to start
    #[arg(long, default_value_t = 1)]
    pub horreum_page: u32,
}

impl Cli {
    pub fn verbosity(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else if self.verbose {
            LevelFilter::INFO
        } else {
            LevelFilter::WARN
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::stderr_only(self.verbosity());
        if !self.no_log_file {
            config.sinks.push(LogSink::File {
                directory: self.log_dir.clone().unwrap_or_else(std::env::temp_dir),
                max_files: 3,
            });
        }
        config
    }

    pub fn mirror_config(&self) -> Result<MirrorConfig, ConfigError> {
        let Command::Upload(upload) = &self.command;
        let token = self
            .horreum_api_token
            .clone()
            .ok_or(ConfigError::Missing("horreum-api-token"))?;
        let mut horreum = HorreumConfig::new(self.horreum_base_url.clone(), token);
        if self.insecure_skip_tls_verify {
            horreum.tls = TlsVerification::Skip;
        }
        let query = ListQuery {
            test_id: upload.horreum_test_id,
            max_count: upload.horreum_count,
            start_page: upload.horreum_page,
            page_size: upload.horreum_limit,
        };
        let config = MirrorConfig::new(horreum, self.store_config()?, query);
        config.validate()?;
        Ok(config)
    }

    fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        match self.backend {
            Backend::Postgres => self.postgres_config(),
            Backend::Sqlite => {
                let path = self
                    .sqlite_path
                    .clone()
                    .ok_or(ConfigError::Missing("sqlite-path"))?;
                Ok(StoreConfig::Sqlite { path })
            }
        }
    }

    #[cfg(feature = "postgres")]
    fn postgres_config(&self) -> Result<StoreConfig, ConfigError> {
        fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
            value.clone().ok_or(ConfigError::Missing(name))
        }
        Ok(StoreConfig::Postgres(PostgresSettings {
            host: required(&self.postgresql_host, "postgresql-host")?,
            port: self.postgresql_port,
            user: required(&self.postgresql_user, "postgresql-user")?,
            password: required(&self.postgresql_pass, "postgresql-pass")?,
            dbname: required(&self.postgresql_db, "postgresql-db")?,
        }))
    }

    #[cfg(not(feature = "postgres"))]
    fn postgres_config(&self) -> Result<StoreConfig, ConfigError> {
        Err(ConfigError::BackendUnavailable("postgres"))
    }
}
