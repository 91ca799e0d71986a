//! RedbStore: embedded document store backed by redb.
//!
//! Documents are JSON-serialized into a single `&str → &[u8]` table named
//! after [`INDEX_NAME`]. Selected by `searchscaled run --state-db` for
//! single-host deployments, and the store behind in-process tests; it is
//! not shared between machines. Transactions run on tokio's blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde_json::Value;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{DocumentStore, INDEX_NAME};

/// Operation State documents keyed by the cluster's document key.
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new(INDEX_NAME);

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        debug!(?path, "redb document store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory redb document store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Number of stored documents. Zero if the index was never created.
    pub fn document_count(&self) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = match txn.open_table(DOCUMENTS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(e) => return Err(StateError::Table(e.to_string())),
        };
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    /// Run a redb transaction on the blocking pool so a caller's timeout
    /// can abandon it without stalling the runtime.
    async fn blocking<T, F>(&self, f: F) -> StateResult<T>
    where
        F: FnOnce(&Database) -> StateResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(map_err!(Transaction))?
    }
}

#[async_trait]
impl DocumentStore for RedbStore {
    async fn ensure_index(&self) -> StateResult<()> {
        self.blocking(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            // Opening a table in a write transaction creates it if absent.
            txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StateResult<Option<Value>> {
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = match txn.open_table(DOCUMENTS) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(StateError::Table(e.to_string())),
            };
            match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let doc: Value =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    Ok(Some(doc))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert(&self, key: &str, document: &Value) -> StateResult<()> {
        let value = serde_json::to_vec(document).map_err(map_err!(Serialize))?;
        let owned_key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            {
                let mut table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
                table
                    .insert(owned_key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(())
        })
        .await?;
        debug!(%key, "document stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn get_before_index_exists_returns_none() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.get("123").await.unwrap().is_none());
        assert_eq!(store.document_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let store = RedbStore::open_in_memory().unwrap();
        store.ensure_index().await.unwrap();
        store.ensure_index().await.unwrap();
        assert_eq!(store.document_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let store = RedbStore::open_in_memory().unwrap();
        let doc = json!({ "operation": "idle" });

        store.upsert("42", &doc).await.unwrap();
        assert_eq!(store.get("42").await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn upsert_overwrites() {
        let store = RedbStore::open_in_memory().unwrap();
        store
            .upsert("42", &json!({ "operation": "scaling_up", "node_delta": 2 }))
            .await
            .unwrap();
        store.upsert("42", &json!({ "operation": "idle" })).await.unwrap();

        let doc = store.get("42").await.unwrap().unwrap();
        assert_eq!(doc, json!({ "operation": "idle" }));
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocked_write_can_be_timed_out() {
        let store = RedbStore::open_in_memory().unwrap();
        store.ensure_index().await.unwrap();

        // A concurrent writer holds the single write lock.
        let held = store.db.begin_write().unwrap();
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            store.upsert("1", &json!({ "operation": "idle" })),
        )
        .await;
        assert!(result.is_err());

        held.abort().unwrap();
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.redb");

        {
            let store = RedbStore::open(&db_path).unwrap();
            store
                .upsert("7", &json!({ "operation": "scaling_down" }))
                .await
                .unwrap();
        }

        let store = RedbStore::open(&db_path).unwrap();
        let doc = store.get("7").await.unwrap().unwrap();
        assert_eq!(doc["operation"], "scaling_down");
    }
}
