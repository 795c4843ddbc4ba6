// ============================================
// MENULENS - Persistent Key/Value Store
// ============================================

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{AnalysisError, AnalysisResult};

/// Namespaced key/value storage backing the result cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AnalysisResult<Option<String>>;
    async fn put(&self, key: &str, value: String) -> AnalysisResult<()>;
    async fn delete(&self, key: &str) -> AnalysisResult<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> AnalysisResult<Vec<String>>;
    /// Returns how many entries were removed.
    async fn delete_prefix(&self, prefix: &str) -> AnalysisResult<usize>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AnalysisError {
    AnalysisError::Storage("cache store lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AnalysisResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> AnalysisResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AnalysisResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AnalysisResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> AnalysisResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

/// SQLite-backed store: a single `kv` table, blocking work kept off the runtime.
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    pub fn open(path: &Path) -> AnalysisResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AnalysisError::Storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> AnalysisResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AnalysisResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> AnalysisResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| poisoned())?;
            f(&conn).map_err(AnalysisError::from)
        })
        .await
        .map_err(|e| AnalysisError::Storage(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> AnalysisResult<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
        })
        .await
    }

    async fn put(&self, key: &str, value: String) -> AnalysisResult<()> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> AnalysisResult<()> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|_| ())
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AnalysisResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> AnalysisResult<usize> {
        let prefix = prefix.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn exercise(store: &dyn CacheStore) {
        store.put("ns_a", "1".to_string()).await.unwrap();
        store.put("ns_b", "2".to_string()).await.unwrap();
        store.put("other", "3".to_string()).await.unwrap();

        assert_eq!(store.get("ns_a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.put("ns_a", "replaced".to_string()).await.unwrap();
        assert_eq!(store.get("ns_a").await.unwrap(), Some("replaced".to_string()));

        let mut keys = store.keys_with_prefix("ns_").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns_a".to_string(), "ns_b".to_string()]);

        store.delete("ns_b").await.unwrap();
        assert_eq!(store.get("ns_b").await.unwrap(), None);

        assert_eq!(store.delete_prefix("ns_").await.unwrap(), 1);
        assert_eq!(store.get("other").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCacheStore::new();
        exercise(&store).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteCacheStore::in_memory().unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_prefix_is_literal() {
        // `_` must not act as a LIKE wildcard
        let store = SqliteCacheStore::in_memory().unwrap();
        store.put("analysis_cache_x", "1".to_string()).await.unwrap();
        store.put("analysisXcacheXy", "2".to_string()).await.unwrap();

        let keys = store.keys_with_prefix("analysis_cache_").await.unwrap();
        assert_eq!(keys, vec!["analysis_cache_x".to_string()]);
    }

    #[tokio::test]
    async fn test_sqlite_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let store = SqliteCacheStore::open(&path).unwrap();
            store.put("k", "v".to_string()).await.unwrap();
        }

        let reopened = SqliteCacheStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some("v".to_string()));
    }
}
