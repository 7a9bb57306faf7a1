use horreum_mirror_source::{HorreumConfig, ListQuery};
#[cfg(feature = "postgres")]
use horreum_mirror_store::PostgresSettings;
use std::path::PathBuf;

use crate::pipeline::DEFAULT_BATCH_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required parameter --{0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("{0} backend is not compiled into this build")]
    BackendUnavailable(&'static str),
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    #[cfg(feature = "postgres")]
    Postgres(PostgresSettings),
    Sqlite { path: PathBuf },
}

/// Everything one mirror run needs, validated before any I/O happens.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub horreum: HorreumConfig,
    pub store: StoreConfig,
    pub query: ListQuery,
    pub batch_size: usize,
}

impl MirrorConfig {
    pub fn new(horreum: HorreumConfig, store: StoreConfig, query: ListQuery) -> Self {
        Self {
            horreum,
            store,
            query,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horreum.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("horreum-base-url"));
        }
        if self.horreum.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("horreum-api-token"));
        }
        if self.query.page_size == 0 {
            return Err(ConfigError::Invalid {
                name: "--horreum-limit",
                reason: "page size must be at least 1".to_string(),
            });
        }
        if self.query.start_page == 0 {
            return Err(ConfigError::Invalid {
                name: "--horreum-page",
                reason: "pages are numbered from 1".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "batch_size",
                reason: "batch size must be at least 1".to_string(),
            });
        }
        match &self.store {
            #[cfg(feature = "postgres")]
            StoreConfig::Postgres(settings) => {
                require("postgresql-host", &settings.host)?;
                require("postgresql-user", &settings.user)?;
                require("postgresql-pass", &settings.password)?;
                require("postgresql-db", &settings.dbname)?;
            }
            StoreConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Missing("sqlite-path"));
                }
            }
        }
        Ok(())
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> MirrorConfig {
        MirrorConfig::new(
            HorreumConfig::new("https://horreum.example.com", "token"),
            StoreConfig::Sqlite {
                path: PathBuf::from("mirror.db"),
            },
            ListQuery::new(7),
        )
    }

    #[test]
    fn accepts_defaults() {
        let config = sqlite_config();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.query.max_count, 100);
        assert_eq!(config.query.start_page, 1);
        assert_eq!(config.query.page_size, 10);
    }

    #[test]
    fn blank_token_is_missing() {
        let mut config = sqlite_config();
        config.horreum.api_token = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("horreum-api-token"))
        ));
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let mut config = sqlite_config();
        config.query.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                name: "--horreum-limit",
                ..
            })
        ));
    }

    #[test]
    fn page_zero_is_invalid() {
        let mut config = sqlite_config();
        config.query.start_page = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_batch_size_names_the_field() {
        let mut config = sqlite_config();
        config.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "batch_size", .. }));
        assert_eq!(
            err.to_string(),
            "invalid value for batch_size: batch size must be at least 1"
        );
    }

    #[test]
    fn invalid_flag_values_name_the_flag() {
        let mut config = sqlite_config();
        config.query.start_page = 0;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid value for --horreum-page: pages are numbered from 1"
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_requires_credentials() {
        let mut config = sqlite_config();
        config.store = StoreConfig::Postgres(PostgresSettings {
            host: "db.example.com".to_string(),
            port: 5432,
            user: "mirror".to_string(),
            password: String::new(),
            dbname: "perf".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("postgresql-pass"))
        ));
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", sqlite_config());
        assert!(!rendered.contains("\"token\""));
        assert!(rendered.contains("<redacted>"));
    }
}
