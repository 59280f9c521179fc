//! SQLite-backed record store
//!
//! One connection behind a mutex is the single writer. WAL journaling with
//! `synchronous=FULL` makes a committed insert durable before `insert`
//! returns.

use super::{RecordFilter, RecordStore};
use crate::error::StoreError;
use crate::models::{AnalysisRecord, Classification, PendingRecord, Sample};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info_span};

/// AUTOINCREMENT keeps ids from being reused after a delete
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS analysis_records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_json     TEXT NOT NULL,
    predicted_class INTEGER NOT NULL,
    recommendation  TEXT NOT NULL,
    received_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analysis_records_class
    ON analysis_records (predicted_class, id);
";

const SELECT_COLUMNS: &str =
    "SELECT id, sample_json, predicted_class, recommendation, received_at FROM analysis_records";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let _span = info_span!("record_store_open", path = %path.display()).entered();

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory store (for testing and ephemeral runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

/// Fixed-width UTC timestamps sort lexically in time order
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_record(conn: &mut Connection, record: &PendingRecord) -> Result<i64, StoreError> {
    let sample_json = serde_json::to_string(&record.sample)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO analysis_records \
         (sample_json, predicted_class, recommendation, received_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            sample_json,
            record.classification.predicted_class,
            record.classification.recommendation,
            encode_timestamp(&record.received_at),
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(id)
}

/// Raw row, decoded outside the rusqlite callback so decode failures
/// surface as [`StoreError::Corrupt`]
struct RawRecord {
    id: i64,
    sample_json: String,
    predicted_class: i64,
    recommendation: String,
    received_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sample_json: row.get(1)?,
            predicted_class: row.get(2)?,
            recommendation: row.get(3)?,
            received_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<AnalysisRecord, StoreError> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let sample: Sample = serde_json::from_str(&self.sample_json)
            .map_err(|e| corrupt(format!("sample: {}", e)))?;
        let predicted_class = u32::try_from(self.predicted_class)
            .map_err(|_| corrupt(format!("predicted_class {}", self.predicted_class)))?;
        let received_at = DateTime::parse_from_rfc3339(&self.received_at)
            .map_err(|e| corrupt(format!("received_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(AnalysisRecord {
            id,
            sample,
            classification: Classification {
                predicted_class,
                recommendation: self.recommendation,
            },
            received_at,
        })
    }
}

fn list_records(conn: &Connection, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR predicted_class = ?1) \
           AND (?2 IS NULL OR received_at >= ?2) \
           AND (?3 IS NULL OR id < ?3) \
         ORDER BY id DESC LIMIT ?4",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(
        params![
            filter.predicted_class,
            filter.since.as_ref().map(encode_timestamp),
            filter.before_id,
            filter.effective_limit() as i64,
        ],
        RawRecord::from_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.decode()?);
    }
    Ok(records)
}

fn get_record(conn: &Connection, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    conn.query_row(&sql, params![id], RawRecord::from_row)
        .optional()?
        .map(RawRecord::decode)
        .transpose()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, record: PendingRecord) -> Result<i64, StoreError> {
        let id = self.with_conn(move |conn| insert_record(conn, &record)).await?;
        debug!(record_id = id, "Analysis record committed");
        Ok(id)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| list_records(conn, &filter)).await
    }

    async fn get(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        self.with_conn(move |conn| get_record(conn, id)).await
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::healthy_sample;
    use chrono::Duration;
    use tempfile::TempDir;

    fn pending(class: u32, received_at: DateTime<Utc>) -> PendingRecord {
        PendingRecord {
            sample: healthy_sample(),
            classification: Classification {
                predicted_class: class,
                recommendation: format!("class {}", class),
            },
            received_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let received_at = Utc::now();

        let id = store.insert(pending(0, received_at)).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.sample, healthy_sample());
        assert_eq!(record.classification.predicted_class, 0);
        assert_eq!(
            record.received_at.timestamp_micros(),
            received_at.timestamp_micros()
        );
        assert!(store.get(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sample_stored_as_submitted() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut sample = healthy_sample();
        sample.total_disk = "1.25G".parse().unwrap();
        sample.used_disk = "0.04G".parse().unwrap();

        let id = store
            .insert(PendingRecord {
                sample: sample.clone(),
                ..pending(0, Utc::now())
            })
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.sample, sample);
        assert_eq!(record.sample.total_disk.to_string(), "1.25G");
        assert_eq!(record.sample.used_disk.to_string(), "0.04G");
    }

    #[tokio::test]
    async fn test_rejected_insert_leaves_no_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");
        let store = SqliteStore::open(&path).unwrap();

        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_inserts BEFORE INSERT ON analysis_records \
                 BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
            )
            .unwrap();

        let err = store.insert(pending(1, Utc::now())).await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)), "{:?}", err);
        assert!(store.list(&RecordFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut last = 0;
        for class in [0, 1, 2, 3, 0] {
            let id = store.insert(pending(class, Utc::now())).await.unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(pending(0, Utc::now())).await.unwrap();
        let newest = store.insert(pending(0, Utc::now())).await.unwrap();

        store
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM analysis_records WHERE id = ?1", params![newest])
            .unwrap();

        let next = store.insert(pending(0, Utc::now())).await.unwrap();
        assert!(next > newest);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let start = Utc::now() - Duration::hours(1);
        for i in 0..6 {
            let class = if i % 2 == 0 { 0 } else { 3 };
            store
                .insert(pending(class, start + Duration::minutes(i)))
                .await
                .unwrap();
        }

        let all = store.list(&RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));

        let upgrades = store
            .list(&RecordFilter {
                predicted_class: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(upgrades.len(), 3);
        assert!(upgrades.iter().all(|r| r.classification.predicted_class == 3));

        let recent = store
            .list(&RecordFilter {
                since: Some(start + Duration::minutes(4)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let first_page = store
            .list(&RecordFilter {
                limit: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        let second_page = store
            .list(&RecordFilter {
                before_id: first_page.last().map(|r| r.id),
                limit: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first_page.len(), 4);
        assert_eq!(second_page.len(), 2);
        assert!(second_page[0].id < first_page[3].id);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(pending(2, Utc::now())).await.unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.classification.predicted_class, 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_get_distinct_ids() {
        let store = SqliteStore::open_in_memory().unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(pending(0, Utc::now())).await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }

    #[tokio::test]
    async fn test_corrupt_row_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO analysis_records \
                 (sample_json, predicted_class, recommendation, received_at) \
                 VALUES ('{}', 0, 'x', 'yesterday')",
                [],
            )
            .unwrap();

        let err = store.list(&RecordFilter::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { id: 1, .. }));
    }
}
