//! # Offline Store Repository
//!
//! String key/value access to the `offline_store` table.
//!
//! ## Write Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  put(key, value)                                                        │
//! │                                                                         │
//! │    INSERT ... ON CONFLICT(key) DO UPDATE                                │
//! │                                                                         │
//! │  • One statement, one row: a record is replaced whole or not at all    │
//! │  • updated_at is stamped on every write (RFC 3339, UTC)                │
//! │  • Nothing here understands the JSON in `value`                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for the offline key/value table.
#[derive(Debug, Clone)]
pub struct OfflineStoreRepository {
    pool: SqlitePool,
}

impl OfflineStoreRepository {
    /// Creates a new OfflineStoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OfflineStoreRepository { pool }
    }

    /// Reads the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM offline_store WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Inserts or replaces the value under `key`.
    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();

        debug!(key = %key, bytes = value.len(), "Writing offline store record");

        sqlx::query(
            r#"
            INSERT INTO offline_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts several records in one transaction: all land or none do.
    pub async fn put_all(&self, entries: &[(String, String)]) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            debug!(key = %key, bytes = value.len(), "Writing offline store record");

            sqlx::query(
                r#"
                INSERT INTO offline_store (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key.as_str())
            .bind(value.as_str())
            .bind(now.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let db = setup().await;
        assert_eq!(db.offline_store().get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_then_get_and_overwrite() {
        let db = setup().await;
        let repo = db.offline_store();

        repo.put("offline-sales-queue:a", "[1]").await.unwrap();
        assert_eq!(repo.get("offline-sales-queue:a").await.unwrap().as_deref(), Some("[1]"));

        repo.put("offline-sales-queue:a", "[1,2]").await.unwrap();
        assert_eq!(repo.get("offline-sales-queue:a").await.unwrap().as_deref(), Some("[1,2]"));
    }

    #[tokio::test]
    async fn test_put_all_writes_every_record() {
        let db = setup().await;
        let repo = db.offline_store();

        repo.put("q", "[old]").await.unwrap();
        repo.put_all(&[
            ("q".to_string(), "[]".to_string()),
            ("c".to_string(), "[x]".to_string()),
        ])
        .await
        .unwrap();

        assert_eq!(repo.get("q").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(repo.get("c").await.unwrap().as_deref(), Some("[x]"));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            db.offline_store().put("k", "persisted").await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(
            db.offline_store().get("k").await.unwrap().as_deref(),
            Some("persisted")
        );
    }
}
