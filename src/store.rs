//! Append-only reading history backed by SQLite.
//!
//! One connection sits behind a mutex and every call runs on the blocking
//! pool. `append` does timestamp + insert + commit while holding the lock,
//! so ids, timestamps and commit order always agree, and `read_all` can
//! only ever observe fully committed rows.

use crate::domain::Reading;
use crate::error::StoreError;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS readings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bpm REAL NOT NULL,
        spo2 REAL NOT NULL,
        timestamp TEXT NOT NULL
    );
"#;

/// Shared handle to the reading store. Cloning is cheap.
#[derive(Clone)]
pub struct ReadingStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReadingStore {
    /// Open (or create) the store at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // every append is flushed before it is acknowledged
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        info!(path = %path.display(), "reading store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Persist one reading and return its id.
    ///
    /// `timestamp` defaults to the current time, taken under the lock.
    pub async fn append(
        &self,
        bpm: f64,
        spo2: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let recorded_at = timestamp.unwrap_or_else(Utc::now);
            tx.execute(
                "INSERT INTO readings (bpm, spo2, timestamp) VALUES (?1, ?2, ?3)",
                params![bpm, spo2, recorded_at],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            debug!(id, bpm, spo2, "reading committed");
            Ok(id)
        })
        .await
    }

    /// All readings, ordered by id ascending.
    pub async fn read_all(&self) -> Result<Vec<Reading>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, bpm, spo2, timestamp FROM readings ORDER BY id ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok(Reading {
                    id: row.get(0)?,
                    bpm: row.get(1)?,
                    spo2: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?;

            let readings = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(readings)
        })
        .await
    }

    /// Number of stored readings.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        // a blocking task runs to completion even if the caller goes away
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    #[cfg(test)]
    pub(crate) async fn drop_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch("DROP TABLE readings;")?;
            Ok(())
        })
        .await
    }
}
