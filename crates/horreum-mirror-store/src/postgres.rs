use horreum_mirror_types::MirrorRecord;
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls};
use tracing::{debug, info};

use crate::{Sink, StoreError, StoreResult, TABLE_NAME, check_batch, encode_json, insert_statement};

#[derive(Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .finish()
    }
}

impl PostgresSettings {
    fn to_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.dbname)
            .application_name("horreum-mirror");
        config
    }
}

pub struct PostgresSink {
    client: Option<Client>,
}

impl std::fmt::Debug for PostgresSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSink")
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl PostgresSink {
    pub fn connect(settings: &PostgresSettings) -> StoreResult<Self> {
        let client = settings.to_config().connect(NoTls).map_err(map_pg_err)?;
        debug!(host = %settings.host, port = settings.port, "Connected to PostgreSQL");
        Ok(Self {
            client: Some(client),
        })
    }

    pub fn connect_dsn(dsn: &str) -> StoreResult<Self> {
        let client = Client::connect(dsn, NoTls).map_err(map_pg_err)?;
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> StoreResult<&mut Client> {
        self.client.as_mut().ok_or(StoreError::Closed)
    }
}

impl Sink for PostgresSink {
    fn ensure_schema(&mut self) -> StoreResult<()> {
        let client = self.client()?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT FROM pg_tables WHERE tablename = $1)",
                &[&TABLE_NAME],
            )
            .map_err(map_pg_err)?;
        if row.get::<_, bool>(0) {
            return Ok(());
        }

        info!("Table not found in PostgreSQL, creating it");
        let mut tx = client.transaction().map_err(map_pg_err)?;
        tx.batch_execute(
            "
            CREATE TABLE IF NOT EXISTS data (
                id SERIAL PRIMARY KEY,
                horreum_testid INTEGER,
                horreum_runid INTEGER,
                horreum_datasetid INTEGER,
                start TIMESTAMP,
                label_values JSONB,
                UNIQUE (horreum_testid, horreum_runid, horreum_datasetid)
            );
            ",
        )
        .map_err(map_pg_err)?;
        tx.commit().map_err(map_pg_err)?;
        Ok(())
    }

    fn insert_batch(&mut self, records: &[MirrorRecord]) -> StoreResult<u64> {
        check_batch(records)?;
        let mut params = PgParams::new();
        for record in records {
            params.add(record.test_id);
            params.add(record.run_id);
            params.add(record.dataset_id);
            params.add(record.start.naive_utc());
            params.add(encode_json(&record.label_values)?);
        }
        let sql = insert_statement(records.len(), |index, column| {
            if column == 4 {
                format!("${}::text::jsonb", index)
            } else {
                format!("${}", index)
            }
        });

        let client = self.client()?;
        let mut tx = client.transaction().map_err(map_pg_err)?;
        let inserted = tx.execute(sql.as_str(), &params.refs()).map_err(map_pg_err)?;
        tx.commit().map_err(map_pg_err)?;
        debug!(
            rows = records.len(),
            inserted, "Inserted rows into PostgreSQL (duplicates ignored)"
        );
        Ok(inserted)
    }

    fn close(&mut self) -> StoreResult<()> {
        if let Some(client) = self.client.take() {
            client.close().map_err(map_pg_err)?;
        }
        Ok(())
    }
}

struct PgParams {
    values: Vec<Box<dyn ToSql + Sync>>,
}

impl PgParams {
    fn new() -> Self {
        Self { values: Vec::new() }
    }

    fn add<T: ToSql + Sync + 'static>(&mut self, value: T) {
        self.values.push(Box::new(value));
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|value| &**value as &(dyn ToSql + Sync))
            .collect()
    }
}

fn map_pg_err(err: postgres::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}
