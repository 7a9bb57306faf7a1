use chrono::SecondsFormat;
use horreum_mirror_types::MirrorRecord;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Sink, StoreError, StoreResult, TABLE_NAME, check_batch, encode_json, insert_statement};

/// Mirror into a local SQLite file. `start` is kept as RFC 3339 text and
/// `label_values` as JSON text.
pub struct SqliteSink {
    path: PathBuf,
    connection: Option<Connection>,
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("path", &self.path)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

impl SqliteSink {
    pub fn open<P: Into<PathBuf>>(path: P) -> StoreResult<Self> {
        let path = path.into();
        if path.to_string_lossy() == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| StoreError::Storage(err.to_string()))?;
            }
        }
        let conn = Connection::open(&path)?;
        configure_connection(&conn, true)?;
        debug!(path = %path.display(), "Opened SQLite mirror");
        Ok(Self {
            path,
            connection: Some(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn, false)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            connection: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count_rows(&self) -> StoreResult<u64> {
        let conn = self.connection.as_ref().ok_or(StoreError::Closed)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", TABLE_NAME),
            [],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|err| StoreError::Storage(err.to_string()))
    }

    fn connection(&mut self) -> StoreResult<&mut Connection> {
        self.connection.as_mut().ok_or(StoreError::Closed)
    }
}

fn configure_connection(conn: &Connection, use_wal: bool) -> StoreResult<()> {
    if use_wal {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
    } else {
        conn.execute_batch(
            "PRAGMA journal_mode = MEMORY;
             PRAGMA synchronous = NORMAL;",
        )?;
    }
    Ok(())
}

impl Sink for SqliteSink {
    fn ensure_schema(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [TABLE_NAME],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(());
        }

        info!("Table not found in SQLite, creating it");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                horreum_testid INTEGER,
                horreum_runid INTEGER,
                horreum_datasetid INTEGER,
                start TEXT,
                label_values TEXT,
                UNIQUE (horreum_testid, horreum_runid, horreum_datasetid)
            );
            ",
        )?;
        tx.commit()?;
        Ok(())
    }

    fn insert_batch(&mut self, records: &[MirrorRecord]) -> StoreResult<u64> {
        check_batch(records)?;
        let mut values = Vec::with_capacity(records.len() * 5);
        for record in records {
            values.push(SqlValue::Integer(i64::from(record.test_id)));
            values.push(SqlValue::Integer(i64::from(record.run_id)));
            values.push(SqlValue::Integer(i64::from(record.dataset_id)));
            values.push(SqlValue::Text(
                record.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
            values.push(SqlValue::Text(encode_json(&record.label_values)?));
        }
        let sql = insert_statement(records.len(), |index, _| format!("?{}", index));

        let conn = self.connection()?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        debug!(
            rows = records.len(),
            inserted, "Inserted rows into SQLite (duplicates ignored)"
        );
        Ok(inserted as u64)
    }

    fn close(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, err)| StoreError::from(err))?;
        }
        Ok(())
    }
}
