//! SQLite schema versions.
//!
//! `schema_migrations` records every applied version. Opening a database runs
//! the missing steps in one transaction and refuses a schema newer than this
//! build understands.

use rusqlite::Connection;

use tillsync_core::now_millis;

use crate::error::{Result, StoreError};

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        other => Err(StoreError::Migration(format!("no migration step for v{}", other))),
    }
}

/// v1: records, queue and freshness tables.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One logical collection per entity type, keyed by entity id
        CREATE TABLE records (
            entity_type TEXT NOT NULL,        -- PRODUCT, CONTACT, SALE, BUSINESS_SETTING
            id TEXT NOT NULL,                 -- entity id
            data TEXT NOT NULL,               -- canonical JSON of the entity
            version INTEGER NOT NULL,         -- monotonically increasing per id
            checksum TEXT NOT NULL,           -- blake3 hex of canonical data
            created_at INTEGER NOT NULL,      -- Unix ms
            last_modified INTEGER NOT NULL,   -- Unix ms
            sync_status TEXT NOT NULL,        -- PENDING, IN_PROGRESS, COMPLETED, FAILED
            synced_at INTEGER,                -- Unix ms of last remote confirmation

            PRIMARY KEY (entity_type, id)
        );

        -- Outbound mutations awaiting remote confirmation
        CREATE TABLE sync_queue (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            operation_type TEXT NOT NULL,     -- CREATE, UPDATE, DELETE
            payload TEXT NOT NULL,            -- JSON
            priority INTEGER NOT NULL,        -- 2=HIGH, 1=MEDIUM, 0=LOW
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_attempt INTEGER,
            status TEXT NOT NULL,
            error TEXT
        );

        -- Last successful pull per reference kind
        CREATE TABLE freshness (
            kind TEXT PRIMARY KEY,            -- products, contacts, settings
            last_fetch INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_records_status ON records(entity_type, sync_status);
        CREATE INDEX idx_queue_status ON sync_queue(status);
        CREATE INDEX idx_queue_priority ON sync_queue(priority);
        CREATE INDEX idx_queue_entity_type ON sync_queue(entity_type);
        CREATE INDEX idx_queue_created_at ON sync_queue(created_at);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"sync_queue".to_string()));
        assert!(tables.contains(&"freshness".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
