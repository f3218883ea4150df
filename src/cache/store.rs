//! Durable backing store for the resource cache
//!
//! Generic key/value persistence with byte-size accounting. The cache is
//! write-through: every admitted entry lands here, so a returning reader
//! gets previously visited chapters without refetching them.
//!
//! Corrupt rows (missing payload, size mismatch, unknown kind) are treated
//! as absent and deleted on load rather than surfaced to callers.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use super::types::{CacheEntry, ResourceKey, ResourceKind};

/// Durable store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable key/value store with byte-size accounting
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load all entries, least-recently-accessed first
    async fn load_all(&self) -> Result<Vec<CacheEntry>, StoreError>;

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Update an entry's last-access timestamp
    async fn touch(&self, key: &ResourceKey, last_accessed_at: i64) -> Result<(), StoreError>;

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;
}

/// In-process store
///
/// Backs embedded sessions that do not want a database file, and timing
/// tests that must not mix the paused clock with database IO. Contents
/// live only as long as the process.
#[derive(Default)]
pub struct MemoryResourceStore {
    entries: parking_lot::Mutex<HashMap<ResourceKey, CacheEntry>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryResourceStore {
    async fn load_all(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let mut entries: Vec<CacheEntry> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.last_accessed_at);
        Ok(entries)
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.entries.lock().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn touch(&self, key: &ResourceKey, last_accessed_at: i64) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.last_accessed_at = last_accessed_at;
        }
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed durable store
pub struct SqliteResourceStore {
    pool: SqlitePool,
}

impl SqliteResourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table if missing
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resource_cache (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                payload BLOB,
                size_bytes INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE INDEX IF NOT EXISTS idx_resource_cache_access
                ON resource_cache(last_accessed_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DurableStore for SqliteResourceStore {
    async fn load_all(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT kind, id, payload, size_bytes, created_at, last_accessed_at
            FROM resource_cache
            ORDER BY last_accessed_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut corrupt: Vec<(String, String)> = Vec::new();

        for row in rows {
            let kind_str: String = row.get("kind");
            let id: String = row.get("id");
            let payload: Option<Vec<u8>> = row.get("payload");
            let size_bytes: i64 = row.get("size_bytes");

            let kind = ResourceKind::from_str(&kind_str);
            let valid = match (&kind, &payload) {
                (Some(_), Some(p)) => p.len() as i64 == size_bytes,
                _ => false,
            };

            if !valid {
                corrupt.push((kind_str, id));
                continue;
            }

            entries.push(CacheEntry {
                key: ResourceKey::new(kind.unwrap(), id),
                payload: payload.unwrap(),
                size_bytes: size_bytes as u64,
                created_at: row.get("created_at"),
                last_accessed_at: row.get("last_accessed_at"),
            });
        }

        for (kind, id) in corrupt {
            tracing::warn!("evicting corrupt cache row {}:{}", kind, id);
            sqlx::query("DELETE FROM resource_cache WHERE kind = ? AND id = ?")
                .bind(&kind)
                .bind(&id)
                .execute(&self.pool)
                .await?;
        }

        Ok(entries)
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resource_cache (kind, id, payload, size_bytes, created_at, last_accessed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, id) DO UPDATE SET
                payload = excluded.payload,
                size_bytes = excluded.size_bytes,
                last_accessed_at = excluded.last_accessed_at
            "#,
        )
        .bind(entry.key.kind.as_str())
        .bind(&entry.key.id)
        .bind(&entry.payload)
        .bind(entry.size_bytes as i64)
        .bind(entry.created_at)
        .bind(entry.last_accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch(&self, key: &ResourceKey, last_accessed_at: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE resource_cache SET last_accessed_at = ? WHERE kind = ? AND id = ?")
            .bind(last_accessed_at)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM resource_cache WHERE kind = ? AND id = ?")
            .bind(key.kind.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> SqliteResourceStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteResourceStore::new(pool);
        store.init().await.unwrap();
        store
    }

    fn entry(id: &str, payload: &[u8], accessed: i64) -> CacheEntry {
        CacheEntry {
            key: ResourceKey::new(ResourceKind::ChapterDescriptions, id),
            payload: payload.to_vec(),
            size_bytes: payload.len() as u64,
            created_at: accessed,
            last_accessed_at: accessed,
        }
    }

    #[tokio::test]
    async fn test_put_and_load_ordered_by_access() {
        let store = setup_store().await;

        store.put(&entry("b/2", b"two", 200)).await.unwrap();
        store.put(&entry("b/1", b"one", 100)).await.unwrap();
        store.put(&entry("b/3", b"three", 300)).await.unwrap();

        let entries = store.load_all().await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.key.id.as_str()).collect();
        assert_eq!(ids, vec!["b/1", "b/2", "b/3"]);
    }

    #[tokio::test]
    async fn test_touch_moves_entry_to_back() {
        let store = setup_store().await;

        store.put(&entry("b/1", b"one", 100)).await.unwrap();
        store.put(&entry("b/2", b"two", 200)).await.unwrap();

        store
            .touch(
                &ResourceKey::new(ResourceKind::ChapterDescriptions, "b/1"),
                300,
            )
            .await
            .unwrap();

        let entries = store.load_all().await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.key.id.as_str()).collect();
        assert_eq!(ids, vec!["b/2", "b/1"]);
    }

    #[tokio::test]
    async fn test_corrupt_rows_are_skipped_and_deleted() {
        let store = setup_store().await;
        store.put(&entry("b/1", b"good", 100)).await.unwrap();

        // Size mismatch
        sqlx::query(
            "INSERT INTO resource_cache (kind, id, payload, size_bytes, created_at, last_accessed_at)
             VALUES ('descriptions', 'b/2', X'00', 999, 1, 1)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        // Missing payload
        sqlx::query(
            "INSERT INTO resource_cache (kind, id, payload, size_bytes, created_at, last_accessed_at)
             VALUES ('descriptions', 'b/3', NULL, 0, 1, 1)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        // Unknown kind
        sqlx::query(
            "INSERT INTO resource_cache (kind, id, payload, size_bytes, created_at, last_accessed_at)
             VALUES ('mystery', 'b/4', X'00', 1, 1, 1)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let entries = store.load_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.id, "b/1");

        // Corrupt rows were deleted, not just skipped
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resource_cache")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_memory_store_orders_by_access() {
        let store = MemoryResourceStore::new();

        store.put(&entry("b/2", b"two", 200)).await.unwrap();
        store.put(&entry("b/1", b"one", 100)).await.unwrap();
        store
            .touch(
                &ResourceKey::new(ResourceKind::ChapterDescriptions, "b/2"),
                300,
            )
            .await
            .unwrap();

        let entries = store.load_all().await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.key.id.as_str()).collect();
        assert_eq!(ids, vec!["b/1", "b/2"]);

        store
            .delete(&ResourceKey::new(ResourceKind::ChapterDescriptions, "b/1"))
            .await
            .unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let store = setup_store().await;
        let e = entry("b/1", b"one", 100);
        store.put(&e).await.unwrap();
        store.delete(&e.key).await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
    }
}
