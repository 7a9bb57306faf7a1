use horreum_mirror_types::{MirrorRecord, NaturalKey};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

#[cfg(feature = "postgres")]
mod postgres;
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresSettings, PostgresSink};
pub use sqlite::SqliteSink;

pub const TABLE_NAME: &str = "data";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("sink is closed")]
    Closed,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Destination of mirrored records.
///
/// Writes are keyed on [`NaturalKey`]: a record whose key is already stored is
/// skipped, never merged, so replaying an overlapping range is a no-op.
pub trait Sink {
    /// Creates the `data` table if it does not exist yet.
    fn ensure_schema(&mut self) -> StoreResult<()>;

    /// Writes a non-empty batch in a single transaction and returns how many
    /// rows were actually inserted. Conflicting rows are not counted.
    fn insert_batch(&mut self, records: &[MirrorRecord]) -> StoreResult<u64>;

    fn close(&mut self) -> StoreResult<()>;
}

/// Sink that keeps rows in memory. Used by tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    schema_ready: bool,
    closed: bool,
    keys: HashSet<NaturalKey>,
    rows: Vec<MirrorRecord>,
    batches: Vec<usize>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[MirrorRecord] {
        &self.rows
    }

    /// Sizes of every batch handed to [`Sink::insert_batch`], in call order.
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batches
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready
    }
}

impl Sink for InMemorySink {
    fn ensure_schema(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.schema_ready = true;
        Ok(())
    }

    fn insert_batch(&mut self, records: &[MirrorRecord]) -> StoreResult<u64> {
        check_batch(records)?;
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.schema_ready {
            return Err(StoreError::Storage(format!(
                "relation \"{}\" does not exist",
                TABLE_NAME
            )));
        }
        let mut inserted = 0;
        for record in records {
            if self.keys.insert(record.natural_key()) {
                self.rows.push(record.clone());
                inserted += 1;
            }
        }
        self.batches.push(records.len());
        debug!(
            rows = records.len(),
            inserted, "Inserted rows in memory (duplicates ignored)"
        );
        Ok(inserted)
    }

    fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn check_batch(records: &[MirrorRecord]) -> StoreResult<()> {
    if records.is_empty() {
        return Err(StoreError::InvalidInput("empty batch".to_string()));
    }
    Ok(())
}

fn encode_json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|err| StoreError::InvalidInput(err.to_string()))
}

/// Multi-row insert that skips rows whose natural key is already stored.
/// `placeholder` renders the 1-based parameter index for the target dialect.
fn insert_statement<F>(rows: usize, placeholder: F) -> String
where
    F: Fn(usize, usize) -> String,
{
    let mut sql = format!(
        "INSERT INTO {} (horreum_testid, horreum_runid, horreum_datasetid, start, label_values) VALUES ",
        TABLE_NAME
    );
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for column in 0..5 {
            if column > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&placeholder(row * 5 + column + 1, column));
        }
        sql.push(')');
    }
    sql.push_str(
        " ON CONFLICT (horreum_testid, horreum_runid, horreum_datasetid) DO NOTHING",
    );
    sql
}
