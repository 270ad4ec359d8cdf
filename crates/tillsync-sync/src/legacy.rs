//! # Legacy Queue Migration
//!
//! Older terminals kept one unscoped queue in a JSON file. The first sync
//! after upgrade folds it into the scope that is active at that moment.
//!
//! ```text
//! offline-sales-queue.json ──read──► [QueuedSale] ──merge (skip known ids)──► scope queue
//!            │                 └── entries that do not parse are skipped
//!            └──────────── removed afterwards, also when unreadable
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tillsync_core::{QueuedSale, SyncScope};

use crate::error::SyncResult;
use crate::store::OfflineStore;

/// What was found at the legacy path.
#[derive(Debug)]
enum LegacyContents {
    Missing,
    Unreadable(String),
    Entries(Vec<QueuedSale>),
}

/// The legacy unscoped queue file.
#[derive(Debug, Clone)]
pub struct LegacyQueueFile {
    path: PathBuf,
}

impl LegacyQueueFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LegacyQueueFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> LegacyContents {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return LegacyContents::Missing,
            Err(e) => return LegacyContents::Unreadable(e.to_string()),
        };

        let values = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(values) => values,
            Err(e) => return LegacyContents::Unreadable(e.to_string()),
        };

        let entries = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<QueuedSale>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        index,
                        error = %e,
                        "Skipping malformed legacy queue entry"
                    );
                    None
                }
            })
            .collect();
        LegacyContents::Entries(entries)
    }

    fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove legacy queue file");
            }
        }
    }

    /// Appends legacy entries to `scope`'s queue, then removes the file.
    ///
    /// Entries whose `local_id` the scope already holds (queued or
    /// conflicted) are skipped. The file is removed even when the merge
    /// fails. Returns the number of sales added.
    pub async fn migrate_into(&self, store: &OfflineStore, scope: &SyncScope) -> SyncResult<usize> {
        let entries = match self.read() {
            LegacyContents::Missing => return Ok(0),
            LegacyContents::Unreadable(reason) => {
                warn!(
                    path = %self.path.display(),
                    error = %reason,
                    "Discarding unreadable legacy offline queue"
                );
                self.remove();
                return Ok(0);
            }
            LegacyContents::Entries(entries) => entries,
        };

        if entries.is_empty() {
            self.remove();
            return Ok(0);
        }

        let found = entries.len();
        let merged = store
            .mutate(scope, |state| {
                let mut added = 0;
                for entry in entries {
                    if !state.contains(&entry.local_id) {
                        state.queue.push(entry);
                        added += 1;
                    }
                }
                added
            })
            .await;

        // Removed even if the merge failed, so it is never retried
        self.remove();
        let added = merged?;

        info!(
            scope_id = %scope.scope_id(),
            found,
            added,
            "Migrated legacy offline queue"
        );
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{CountCache, NoOpEmitter, Notifier};
    use crate::scope::StaticScopeProvider;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use tillsync_core::{Amount, CreateSalePayload, SaleItemInput};
    use tillsync_db::{Database, DbConfig};

    async fn store_for(scope: &SyncScope) -> OfflineStore {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counts = Arc::new(CountCache::new());
        let notifier = Arc::new(Notifier::new(
            Arc::new(StaticScopeProvider::new(scope.clone())),
            counts.clone(),
            Arc::new(NoOpEmitter),
        ));
        OfflineStore::new(&db, counts, notifier)
    }

    fn legacy_entry(local_id: &str) -> serde_json::Value {
        json!({
            "localId": local_id,
            "payload": {
                "items": [{"product_id": 1, "quantity": 1, "price": 2.5}],
                "payment_method": "cash"
            },
            "queuedAt": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;

        let legacy = LegacyQueueFile::new(dir.path().join("absent.json"));
        assert_eq!(legacy.migrate_into(&store, &scope).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entries_are_appended_and_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            json!([legacy_entry("offline-old-1"), legacy_entry("offline-old-2")]).to_string(),
        )
        .unwrap();

        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;
        let payload = CreateSalePayload::new(
            vec![SaleItemInput::new(1, 1, 1)],
            "cash",
        );
        store
            .write_queue(&scope, &[QueuedSale::new("offline-new", payload, Utc::now())])
            .await
            .unwrap();

        let legacy = LegacyQueueFile::new(&path);
        assert_eq!(legacy.migrate_into(&store, &scope).await.unwrap(), 2);
        assert!(!path.exists());

        let queue = store.read_queue(&scope).await;
        let ids: Vec<_> = queue.iter().map(|s| s.local_id.as_str()).collect();
        assert_eq!(ids, vec!["offline-new", "offline-old-1", "offline-old-2"]);
        assert_eq!(queue[1].attempts, 0);
        assert_eq!(queue[1].payload.items[0].price.as_f64(), 2.5);
    }

    #[tokio::test]
    async fn test_weighed_entry_survives_and_bad_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let weighed = json!({
            "localId": "offline-weighed",
            "payload": {
                "items": [{"product_id": 8, "quantity": 1.5, "price": 0.125}],
                "payment_method": "cash"
            },
            "queuedAt": "2024-05-01T10:00:00Z"
        });
        std::fs::write(
            &path,
            json!([weighed, {"localId": 17}, legacy_entry("offline-old-1")]).to_string(),
        )
        .unwrap();

        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;

        let legacy = LegacyQueueFile::new(&path);
        assert_eq!(legacy.migrate_into(&store, &scope).await.unwrap(), 2);
        assert!(!path.exists());

        let queue = store.read_queue(&scope).await;
        assert_eq!(queue[0].local_id, "offline-weighed");
        let item = &queue[0].payload.items[0];
        assert_eq!(item.quantity, Amount::from_f64(1.5).unwrap());
        assert_eq!(serde_json::to_value(&item.price).unwrap(), json!(0.125));
        assert_eq!(queue[1].local_id, "offline-old-1");
    }

    #[tokio::test]
    async fn test_known_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            json!([legacy_entry("offline-dup"), legacy_entry("offline-dup")]).to_string(),
        )
        .unwrap();

        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;

        let legacy = LegacyQueueFile::new(&path);
        assert_eq!(legacy.migrate_into(&store, &scope).await.unwrap(), 1);
        assert_eq!(store.read_queue(&scope).await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "[{\"broken\"").unwrap();

        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;

        let legacy = LegacyQueueFile::new(&path);
        assert_eq!(legacy.migrate_into(&store, &scope).await.unwrap(), 0);
        assert!(!path.exists());
        assert!(store.read_queue(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "[]").unwrap();

        let scope = SyncScope::new("t1", "u1");
        let store = store_for(&scope).await;

        LegacyQueueFile::new(&path).migrate_into(&store, &scope).await.unwrap();
        assert!(!path.exists());
    }
}
