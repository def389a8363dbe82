//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. The database runs in WAL mode
//! with `synchronous=FULL`, so a committed write survives power loss before
//! the call returns.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use tillsync_core::{
    canonical_bytes, Checksum, EntityType, Priority, QueueItem, QueueItemId, ReferenceKind,
    SyncStatus, SYNC_STATUS_INDEX,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{QueueStats, Store, StoredRecord};

const RECORD_COLUMNS: &str =
    "id, data, version, checksum, created_at, last_modified, sync_status, synced_at";

const QUEUE_COLUMNS: &str = "id, entity_type, operation_type, payload, priority, retry_count,
     created_at, last_attempt, status, error";

const QUEUE_ORDER: &str = "ORDER BY priority DESC, retry_count ASC, created_at ASC, id ASC";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        configure(&conn)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("sqlite connection: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    tracing::debug!(journal_mode = %mode, "sqlite store configured");
    Ok(())
}

// Raw record columns, decoded outside the rusqlite row closure so that a
// corrupted payload surfaces as an integrity error rather than a SQL error.
struct RecordRow {
    id: String,
    data: String,
    version: i64,
    checksum: String,
    created_at: i64,
    last_modified: i64,
    sync_status: String,
    synced_at: Option<i64>,
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get("id")?,
        data: row.get("data")?,
        version: row.get("version")?,
        checksum: row.get("checksum")?,
        created_at: row.get("created_at")?,
        last_modified: row.get("last_modified")?,
        sync_status: row.get("sync_status")?,
        synced_at: row.get("synced_at")?,
    })
}

impl RecordRow {
    fn into_record(self, entity: EntityType) -> Result<StoredRecord> {
        let data: Value = serde_json::from_str(&self.data).map_err(|e| StoreError::Integrity {
            entity,
            id: self.id.clone(),
            detail: format!("unreadable data: {}", e),
        })?;
        let sync_status = self
            .sync_status
            .parse::<SyncStatus>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;

        Ok(StoredRecord {
            id: self.id,
            data,
            version: self.version as u64,
            checksum: Checksum::from_hex(self.checksum),
            created_at: self.created_at,
            last_modified: self.last_modified,
            sync_status,
            synced_at: self.synced_at,
        })
    }
}

fn rows_into_records(rows: Vec<RecordRow>, entity: EntityType) -> Result<Vec<StoredRecord>> {
    rows.into_iter().map(|r| r.into_record(entity)).collect()
}

struct QueueRow {
    id: String,
    entity_type: String,
    operation_type: String,
    payload: String,
    priority: i64,
    retry_count: i64,
    created_at: i64,
    last_attempt: Option<i64>,
    status: String,
    error: Option<String>,
}

fn read_queue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok(QueueRow {
        id: row.get("id")?,
        entity_type: row.get("entity_type")?,
        operation_type: row.get("operation_type")?,
        payload: row.get("payload")?,
        priority: row.get("priority")?,
        retry_count: row.get("retry_count")?,
        created_at: row.get("created_at")?,
        last_attempt: row.get("last_attempt")?,
        status: row.get("status")?,
        error: row.get("error")?,
    })
}

impl QueueRow {
    fn into_item(self) -> Result<QueueItem> {
        let invalid = |e: tillsync_core::CoreError| StoreError::InvalidData(e.to_string());
        let priority = u8::try_from(self.priority)
            .ok()
            .and_then(Priority::from_rank)
            .ok_or_else(|| StoreError::InvalidData(format!("priority {}", self.priority)))?;

        Ok(QueueItem {
            id: QueueItemId::from_string(self.id),
            entity_type: self.entity_type.parse().map_err(invalid)?,
            operation_type: self.operation_type.parse().map_err(invalid)?,
            payload: serde_json::from_str(&self.payload)?,
            priority,
            retry_count: self.retry_count.max(0) as u32,
            created_at: self.created_at,
            last_attempt: self.last_attempt,
            status: self.status.parse().map_err(invalid)?,
            error: self.error,
        })
    }
}

fn rows_into_items(rows: Vec<QueueRow>) -> Result<Vec<QueueItem>> {
    rows.into_iter().map(QueueRow::into_item).collect()
}

fn encode_data(value: &Value) -> Result<String> {
    String::from_utf8(canonical_bytes(value)).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_record(conn: &Connection, entity: EntityType, record: &StoredRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO records (
            entity_type, id, data, version, checksum, created_at, last_modified,
            sync_status, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entity.as_str(),
            record.id,
            encode_data(&record.data)?,
            record.version as i64,
            record.checksum.as_str(),
            record.created_at,
            record.last_modified,
            record.sync_status.as_str(),
            record.synced_at,
        ],
    )?;
    Ok(())
}

/// Map a JSON lookup value onto a SQL parameter comparable with
/// `json_extract` output.
fn index_param(value: &Value) -> Result<Option<SqlValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(SqlValue::Integer(*b as i64))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Some(SqlValue::Integer(i))),
            None => Ok(Some(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)))),
        },
        Value::String(s) => Ok(Some(SqlValue::Text(s.clone()))),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidData(
            "index lookups take scalar values".into(),
        )),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_record(&self, entity: EntityType, id: &str) -> Result<Option<StoredRecord>> {
        let id = id.to_string();

        let row = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {} FROM records WHERE entity_type = ?1 AND id = ?2",
                    RECORD_COLUMNS
                );
                conn.query_row(&sql, params![entity.as_str(), id], read_record_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;

        row.map(|r| r.into_record(entity)).transpose()
    }

    async fn put_record(&self, entity: EntityType, record: &StoredRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |conn| write_record(conn, entity, &record))
            .await
    }

    async fn delete_record(&self, entity: EntityType, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let n = conn.execute(
                "DELETE FROM records WHERE entity_type = ?1 AND id = ?2",
                params![entity.as_str(), id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn get_all_records(&self, entity: EntityType) -> Result<Vec<StoredRecord>> {
        let rows = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {} FROM records WHERE entity_type = ?1 ORDER BY id",
                    RECORD_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![entity.as_str()], read_record_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows_into_records(rows, entity)
    }

    async fn get_records_by_index(
        &self,
        entity: EntityType,
        index: &str,
        value: &Value,
    ) -> Result<Vec<StoredRecord>> {
        if !entity.has_index(index) {
            return Err(StoreError::UnknownIndex {
                entity,
                index: index.to_string(),
            });
        }

        // Declared index names are static identifiers, safe to splice.
        let column = if index == SYNC_STATUS_INDEX {
            "sync_status".to_string()
        } else {
            format!("json_extract(data, '$.{}')", index)
        };
        let param = index_param(value)?;

        let rows = self
            .run(move |conn| {
                let (predicate, bound) = match param {
                    Some(v) => (format!("{} = ?2", column), vec![v]),
                    None => (format!("{} IS NULL", column), Vec::new()),
                };
                let sql = format!(
                    "SELECT {} FROM records WHERE entity_type = ?1 AND {} ORDER BY id",
                    RECORD_COLUMNS, predicate
                );

                let mut args: Vec<SqlValue> = vec![SqlValue::Text(entity.as_str().to_string())];
                args.extend(bound);

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args), read_record_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows_into_records(rows, entity)
    }

    async fn replace_records(&self, entity: EntityType, records: &[StoredRecord]) -> Result<()> {
        let records = records.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM records WHERE entity_type = ?1",
                params![entity.as_str()],
            )?;
            for record in &records {
                write_record(&tx, entity, record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()> {
        let item = item.clone();
        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE id = ?1)",
                params![item.id.as_str()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StoreError::AlreadyExists(item.id.to_string()));
            }

            conn.execute(
                "INSERT INTO sync_queue (
                    id, entity_type, operation_type, payload, priority, retry_count,
                    created_at, last_attempt, status, error
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    item.id.as_str(),
                    item.entity_type.as_str(),
                    item.operation_type.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.priority.rank() as i64,
                    item.retry_count as i64,
                    item.created_at,
                    item.last_attempt,
                    item.status.as_str(),
                    item.error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_queue_item(&self, item: &QueueItem) -> Result<()> {
        let item = item.clone();
        self.run(move |conn| {
            let n = conn.execute(
                "UPDATE sync_queue SET
                    entity_type = ?2, operation_type = ?3, payload = ?4, priority = ?5,
                    retry_count = ?6, created_at = ?7, last_attempt = ?8, status = ?9,
                    error = ?10
                 WHERE id = ?1",
                params![
                    item.id.as_str(),
                    item.entity_type.as_str(),
                    item.operation_type.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.priority.rank() as i64,
                    item.retry_count as i64,
                    item.created_at,
                    item.last_attempt,
                    item.status.as_str(),
                    item.error,
                ],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(item.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn get_queue_item(&self, id: &QueueItemId) -> Result<Option<QueueItem>> {
        let id = id.clone();
        let row = self
            .run(move |conn| {
                let sql = format!("SELECT {} FROM sync_queue WHERE id = ?1", QUEUE_COLUMNS);
                conn.query_row(&sql, params![id.as_str()], read_queue_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;

        row.map(QueueRow::into_item).transpose()
    }

    async fn delete_queue_item(&self, id: &QueueItemId) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let n = conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id.as_str()])?;
            Ok(n > 0)
        })
        .await
    }

    async fn get_queue_items(&self, status: Option<SyncStatus>) -> Result<Vec<QueueItem>> {
        let rows = self
            .run(move |conn| {
                let rows = match status {
                    Some(status) => {
                        let sql = format!(
                            "SELECT {} FROM sync_queue WHERE status = ?1 {}",
                            QUEUE_COLUMNS, QUEUE_ORDER
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map(params![status.as_str()], read_queue_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        rows
                    }
                    None => {
                        let sql = format!("SELECT {} FROM sync_queue {}", QUEUE_COLUMNS, QUEUE_ORDER);
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([], read_queue_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await?;

        rows_into_items(rows)
    }

    async fn get_queue_items_by_entity(&self, entity: EntityType) -> Result<Vec<QueueItem>> {
        let rows = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {} FROM sync_queue WHERE entity_type = ?1 {}",
                    QUEUE_COLUMNS, QUEUE_ORDER
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![entity.as_str()], read_queue_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows_into_items(rows)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let counts = self
            .run(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
                let counts = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(counts)
            })
            .await?;

        let mut per_status = [0usize; 4];
        for (status, count) in counts {
            let status = status
                .parse::<SyncStatus>()
                .map_err(|e| StoreError::InvalidData(e.to_string()))?;
            let slot = SyncStatus::ALL
                .iter()
                .position(|s| *s == status)
                .unwrap_or_default();
            per_status[slot] = count.max(0) as usize;
        }

        Ok(QueueStats::from_counts(
            per_status[0],
            per_status[1],
            per_status[2],
            per_status[3],
        ))
    }

    async fn delete_queue_items_by_status(&self, status: SyncStatus) -> Result<usize> {
        self.run(move |conn| {
            let n = conn.execute(
                "DELETE FROM sync_queue WHERE status = ?1",
                params![status.as_str()],
            )?;
            Ok(n)
        })
        .await
    }

    async fn get_last_fetch(&self, kind: ReferenceKind) -> Result<Option<i64>> {
        self.run(move |conn| {
            conn.query_row(
                "SELECT last_fetch FROM freshness WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn set_last_fetch(&self, kind: ReferenceKind, at: i64) -> Result<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO freshness (kind, last_fetch) VALUES (?1, ?2)
                 ON CONFLICT(kind) DO UPDATE SET last_fetch = excluded.last_fetch",
                params![kind.as_str(), at],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tillsync_core::{verify_integrity, wrap_with_version, OperationType, RetryPolicy};

    fn product(id: &str, sku: &str, category: &str) -> StoredRecord {
        wrap_with_version(json!({"id": id, "sku": sku, "category": category, "price": 100}), id, None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_record() {
        let store = SqliteStore::open_memory().unwrap();
        let record = product("p1", "A-1", "drinks");

        store.put_record(EntityType::Product, &record).await.unwrap();

        let got = store.get_record(EntityType::Product, "p1").await.unwrap().unwrap();
        assert_eq!(got, record);
        assert!(verify_integrity(&got));

        // Collections are separate per entity type.
        assert!(store.get_record(EntityType::Contact, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put_record(EntityType::Product, &product("p1", "A-1", "drinks"))
            .await
            .unwrap();

        assert!(store.delete_record(EntityType::Product, "p1").await.unwrap());
        assert!(!store.delete_record(EntityType::Product, "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_index_lookup() {
        let store = SqliteStore::open_memory().unwrap();
        for (id, sku, cat) in [("p1", "A-1", "drinks"), ("p2", "A-2", "food"), ("p3", "A-3", "drinks")] {
            store
                .put_record(EntityType::Product, &product(id, sku, cat))
                .await
                .unwrap();
        }

        let drinks = store
            .get_records_by_index(EntityType::Product, "category", &json!("drinks"))
            .await
            .unwrap();
        let ids: Vec<_> = drinks.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);

        let pending = store
            .get_records_by_index(EntityType::Product, SYNC_STATUS_INDEX, &json!("PENDING"))
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);

        let err = store
            .get_records_by_index(EntityType::Product, "colour", &json!("red"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownIndex { .. }));
    }

    #[tokio::test]
    async fn test_corrupted_payload_detected() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put_record(EntityType::Product, &product("p1", "A-1", "drinks"))
            .await
            .unwrap();

        // Flip one byte of the stored payload.
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE records SET data = replace(data, '\"price\":100', '\"price\":900')
                 WHERE id = 'p1'",
                [],
            )
            .unwrap();
        }

        let got = store.get_record(EntityType::Product, "p1").await.unwrap().unwrap();
        assert!(!verify_integrity(&got));
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_integrity_error() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put_record(EntityType::Product, &product("p1", "A-1", "drinks"))
            .await
            .unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE records SET data = substr(data, 2) WHERE id = 'p1'", [])
                .unwrap();
        }

        let err = store.get_record(EntityType::Product, "p1").await.unwrap_err();
        assert!(err.is_integrity());
    }

    #[tokio::test]
    async fn test_replace_records() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put_record(EntityType::Product, &product("old", "X", "misc"))
            .await
            .unwrap();

        let fresh = vec![product("p1", "A-1", "drinks"), product("p2", "A-2", "food")];
        store.replace_records(EntityType::Product, &fresh).await.unwrap();

        let all = store.get_all_records(EntityType::Product).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_queue_roundtrip_and_order() {
        let store = SqliteStore::open_memory().unwrap();

        let mut low = QueueItem::new(EntityType::BusinessSetting, OperationType::Update, json!({"id": "s"}), Priority::Low);
        low.created_at = 1;
        let mut high = QueueItem::new(EntityType::Sale, OperationType::Create, json!({"id": "x"}), Priority::High);
        high.created_at = 2;
        let mut retried = QueueItem::new(EntityType::Sale, OperationType::Create, json!({"id": "y"}), Priority::High);
        retried.created_at = 0;
        retried.retry_count = 3;

        for item in [&low, &high, &retried] {
            store.insert_queue_item(item).await.unwrap();
        }

        let items = store.get_queue_items(Some(SyncStatus::Pending)).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec![high.id.clone(), retried.id.clone(), low.id.clone()]);
        assert_eq!(items[0], high);

        let err = store.insert_queue_item(&high).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_queue_update_and_stats() {
        let store = SqliteStore::open_memory().unwrap();
        let mut item = QueueItem::new(EntityType::Contact, OperationType::Update, json!({"id": "c1"}), Priority::Medium);
        store.insert_queue_item(&item).await.unwrap();

        item.record_application_failure("bad email", &RetryPolicy::default());
        store.update_queue_item(&item).await.unwrap();

        let got = store.get_queue_item(&item.id).await.unwrap().unwrap();
        assert_eq!(got.retry_count, 1);
        assert_eq!(got.error.as_deref(), Some("bad email"));

        let mut done = QueueItem::new(EntityType::Sale, OperationType::Create, json!({"id": "s1"}), Priority::High);
        done.mark_completed();
        store.insert_queue_item(&done).await.unwrap();

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats, QueueStats::from_counts(1, 0, 1, 0));

        assert_eq!(store.delete_queue_items_by_status(SyncStatus::Completed).await.unwrap(), 1);
        assert_eq!(store.queue_stats().await.unwrap().total, 1);

        let ghost = QueueItem::new(EntityType::Sale, OperationType::Create, json!({}), Priority::High);
        assert!(matches!(
            store.update_queue_item(&ghost).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_freshness_upsert() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_last_fetch(ReferenceKind::Products).await.unwrap(), None);

        store.set_last_fetch(ReferenceKind::Products, 10).await.unwrap();
        store.set_last_fetch(ReferenceKind::Products, 20).await.unwrap();
        assert_eq!(store.get_last_fetch(ReferenceKind::Products).await.unwrap(), Some(20));
        assert_eq!(store.get_last_fetch(ReferenceKind::Contacts).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos.db");

        let item = QueueItem::new(EntityType::Sale, OperationType::Create, json!({"id": "s1"}), Priority::High);
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .put_record(EntityType::Sale, &wrap_with_version(json!({"id": "s1", "total": 1250}), "s1", None).unwrap())
                .await
                .unwrap();
            store.insert_queue_item(&item).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_record(EntityType::Sale, "s1").await.unwrap().is_some());
        assert_eq!(store.get_queue_item(&item.id).await.unwrap(), Some(item));
    }

    mod order {
        use super::*;
        use crate::MemoryStore;
        use proptest::prelude::*;
        use tillsync_core::{Priority, QueueItem};

        fn item(entity: EntityType, rank: u8, retries: u32, created_at: i64) -> QueueItem {
            let priority = Priority::from_rank(rank).unwrap_or(Priority::Low);
            let mut item = QueueItem::new(entity, OperationType::Create, json!({}), priority);
            item.retry_count = retries;
            item.created_at = created_at;
            item
        }

        fn shape() -> impl Strategy<Value = Vec<(usize, u8, u32, i64)>> {
            prop::collection::vec((0usize..4, 0u8..3, 0u32..3, 0i64..5), 1..12)
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn backends_agree_on_queue_order(shape in shape()) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let (sqlite_ids, memory_ids) = rt.block_on(async {
                    let sqlite = SqliteStore::open_memory().unwrap();
                    let memory = MemoryStore::new();
                    for (entity, rank, retries, created_at) in shape {
                        let item = item(EntityType::ALL[entity], rank, retries, created_at);
                        sqlite.insert_queue_item(&item).await.unwrap();
                        memory.insert_queue_item(&item).await.unwrap();
                    }
                    let ids = |items: Vec<QueueItem>| -> Vec<QueueItemId> {
                        items.into_iter().map(|i| i.id).collect()
                    };
                    (
                        ids(sqlite.get_queue_items(None).await.unwrap()),
                        ids(memory.get_queue_items(None).await.unwrap()),
                    )
                });
                prop_assert_eq!(sqlite_ids, memory_ids);
            }
        }
    }
}
