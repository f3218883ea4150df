//! Local resource cache
//!
//! Bounded, evicting key/value store for chapter payloads and generated
//! artifacts, persisted across process restarts.
//!
//! # Eviction
//!
//! True LRU by last access: reads refresh recency, and a `put` that pushes
//! resident bytes over capacity synchronously evicts the least-recently
//! accessed entries, exactly enough to admit the new one and never more.
//!
//! # Failure semantics
//!
//! Storage errors degrade to cache-miss behavior: a failed write-through or
//! touch is logged and the in-memory cache keeps serving; a corrupt row is
//! treated as absent and silently evicted on load. Callers never see
//! storage errors.

mod store;
mod types;

pub use store::{DurableStore, MemoryResourceStore, SqliteResourceStore, StoreError};
pub use types::{CacheEntry, ResourceKey, ResourceKind};

use std::sync::Arc;

use lru::LruCache;

use crate::sync::MonotonicClock;

struct LruState {
    entries: LruCache<ResourceKey, CacheEntry>,
    total_bytes: u64,
}

/// Bounded LRU cache with durable write-through
#[derive(Clone)]
pub struct ResourceCache {
    state: Arc<parking_lot::Mutex<LruState>>,
    store: Arc<dyn DurableStore>,
    capacity_bytes: u64,
    /// Access stamps never tie, so persisted recency order is total and a
    /// restart restores exactly the order it left off with
    clock: Arc<MonotonicClock>,
}

impl ResourceCache {
    /// Open the cache, warming the in-memory index from the durable store
    ///
    /// Entries load least-recently-accessed first so recency order survives
    /// a restart; anything over capacity (the configuration may have
    /// shrunk) is evicted immediately.
    pub async fn open(store: Arc<dyn DurableStore>, capacity_bytes: u64) -> Self {
        let mut entries = LruCache::unbounded();
        let mut total_bytes = 0u64;
        let clock = MonotonicClock::new();

        match store.load_all().await {
            Ok(loaded) => {
                for entry in loaded {
                    total_bytes += entry.size_bytes;
                    clock.advance_to(entry.last_accessed_at);
                    entries.put(entry.key.clone(), entry);
                }
            }
            Err(e) => {
                tracing::warn!("cache warm start failed, starting cold: {}", e);
            }
        }

        let cache = Self {
            state: Arc::new(parking_lot::Mutex::new(LruState {
                entries,
                total_bytes,
            })),
            store,
            capacity_bytes,
            clock: Arc::new(clock),
        };

        let evicted = {
            let mut state = cache.state.lock();
            evict_to_fit(&mut state, capacity_bytes)
        };
        cache.delete_evicted(evicted).await;

        cache
    }

    /// Look up an entry, refreshing its recency on hit
    pub async fn get(&self, key: &ResourceKey) -> Option<CacheEntry> {
        let now = self.clock.now_ms();
        let hit = {
            let mut state = self.state.lock();
            state.entries.get_mut(key).map(|entry| {
                entry.last_accessed_at = now;
                entry.clone()
            })
        };

        if hit.is_some() {
            // Best effort; a failed touch only costs recency after restart
            if let Err(e) = self.store.touch(key, now).await {
                tracing::debug!("cache touch failed for {}: {}", key, e);
            }
        }

        hit
    }

    /// Admit a payload, evicting least-recently-used entries as needed
    ///
    /// A payload larger than the whole cache is not admitted.
    pub async fn put(&self, key: ResourceKey, payload: Vec<u8>) {
        let size_bytes = payload.len() as u64;
        if size_bytes > self.capacity_bytes {
            tracing::warn!(
                "payload for {} ({} bytes) exceeds cache capacity, not admitting",
                key,
                size_bytes
            );
            return;
        }

        let now = self.clock.now_ms();
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
        };

        let evicted = {
            let mut state = self.state.lock();
            if let Some(old) = state.entries.peek(&key) {
                state.total_bytes -= old.size_bytes;
            }
            state.total_bytes += size_bytes;
            state.entries.put(key, entry.clone());
            evict_to_fit(&mut state, self.capacity_bytes)
        };

        if let Err(e) = self.store.put(&entry).await {
            tracing::warn!("cache write-through failed for {}: {}", entry.key, e);
        }
        self.delete_evicted(evicted).await;
    }

    /// Drop an entry (e.g. the resource was regenerated or failed to decode)
    pub async fn invalidate(&self, key: &ResourceKey) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.entries.pop(key);
            if let Some(ref entry) = removed {
                state.total_bytes -= entry.size_bytes;
            }
            removed
        };

        if removed.is_some() {
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!("cache delete failed for {}: {}", key, e);
            }
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    async fn delete_evicted(&self, evicted: Vec<ResourceKey>) {
        for key in evicted {
            tracing::debug!("evicted {}", key);
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!("cache evict delete failed for {}: {}", key, e);
            }
        }
    }
}

/// Pop LRU entries until resident bytes fit the capacity
///
/// Never pops more than needed; the freshly admitted entry is MRU and is
/// only reachable once everything older is gone.
fn evict_to_fit(state: &mut LruState, capacity_bytes: u64) -> Vec<ResourceKey> {
    let mut evicted = Vec::new();
    while state.total_bytes > capacity_bytes {
        match state.entries.pop_lru() {
            Some((key, entry)) => {
                state.total_bytes -= entry.size_bytes;
                evicted.push(key);
            }
            None => break,
        }
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    async fn sqlite_store() -> (Arc<SqliteResourceStore>, SqlitePool) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteResourceStore::new(pool.clone());
        store.init().await.unwrap();
        (Arc::new(store), pool)
    }

    fn chapter_key(index: u32) -> ResourceKey {
        ResourceKey::chapter_descriptions("book-1", index)
    }

    /// Payload of a fixed size so capacity behaves like an entry count
    fn payload(size: usize) -> Vec<u8> {
        vec![0xAB; size]
    }

    #[tokio::test]
    async fn test_capacity_never_exceeded() {
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 100).await;

        for i in 0..20 {
            cache.put(chapter_key(i), payload(30)).await;
            assert!(cache.total_bytes() <= 100);
        }
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_lru_scenario_chapter_six_evicts_chapter_three() {
        // Cache holds chapters 3, 4, 5 at capacity three; entering chapter 6
        // evicts chapter 3, the least recently accessed.
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 30).await;

        cache.put(chapter_key(3), payload(10)).await;
        cache.put(chapter_key(4), payload(10)).await;
        cache.put(chapter_key(5), payload(10)).await;

        cache.put(chapter_key(6), payload(10)).await;

        assert!(!cache.contains(&chapter_key(3)));
        assert!(cache.contains(&chapter_key(4)));
        assert!(cache.contains(&chapter_key(5)));
        assert!(cache.contains(&chapter_key(6)));
    }

    #[tokio::test]
    async fn test_reads_refresh_recency() {
        // True LRU, not FIFO: reading the oldest entry saves it from eviction
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 30).await;

        cache.put(chapter_key(1), payload(10)).await;
        cache.put(chapter_key(2), payload(10)).await;
        cache.put(chapter_key(3), payload(10)).await;

        cache.get(&chapter_key(1)).await.unwrap();
        cache.put(chapter_key(4), payload(10)).await;

        assert!(cache.contains(&chapter_key(1)));
        assert!(!cache.contains(&chapter_key(2)));
    }

    #[tokio::test]
    async fn test_eviction_removes_exactly_enough() {
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 100).await;

        cache.put(chapter_key(1), payload(30)).await;
        cache.put(chapter_key(2), payload(30)).await;
        cache.put(chapter_key(3), payload(30)).await;

        // 90 + 40 = 130; evicting one 30-byte entry suffices
        cache.put(chapter_key(4), payload(40)).await;

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.total_bytes(), 100);
        assert!(!cache.contains(&chapter_key(1)));
        assert!(cache.contains(&chapter_key(2)));
    }

    #[tokio::test]
    async fn test_replacing_entry_adjusts_accounting() {
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 100).await;

        cache.put(chapter_key(1), payload(60)).await;
        cache.put(chapter_key(1), payload(20)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 20);
    }

    #[tokio::test]
    async fn test_oversized_payload_not_admitted() {
        let (store, _pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 50).await;

        cache.put(chapter_key(1), payload(51)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_survives_restart_with_recency_order() {
        let (store, pool) = sqlite_store().await;
        {
            let cache = ResourceCache::open(store, 30).await;
            cache.put(chapter_key(1), payload(10)).await;
            cache.put(chapter_key(2), payload(10)).await;
            cache.put(chapter_key(3), payload(10)).await;
            // Chapter 1 becomes most recently used before "shutdown"
            cache.get(&chapter_key(1)).await.unwrap();
        }

        // Reopen over the same database
        let store = Arc::new(SqliteResourceStore::new(pool));
        let cache = ResourceCache::open(store, 30).await;

        assert_eq!(cache.len(), 3);
        let hit = cache.get(&chapter_key(2)).await.unwrap();
        assert_eq!(hit.payload, payload(10));

        // Chapter 3 is now the LRU entry (1 was touched, 2 just read)
        cache.put(chapter_key(4), payload(10)).await;
        assert!(!cache.contains(&chapter_key(3)));
        assert!(cache.contains(&chapter_key(1)));
    }

    #[tokio::test]
    async fn test_access_stamps_never_tie() {
        // Puts and gets landing within one wall-clock millisecond must
        // still persist a total recency order
        let (store, pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 100).await;

        for i in 0..5 {
            cache.put(chapter_key(i), payload(10)).await;
        }
        cache.get(&chapter_key(0)).await.unwrap();

        let stamps: Vec<(i64,)> =
            sqlx::query_as("SELECT last_accessed_at FROM resource_cache ORDER BY last_accessed_at ASC")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(stamps.len(), 5);
        for pair in stamps.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[tokio::test]
    async fn test_invalidate_removes_everywhere() {
        let (store, pool) = sqlite_store().await;
        let cache = ResourceCache::open(store, 100).await;

        cache.put(chapter_key(1), payload(10)).await;
        cache.invalidate(&chapter_key(1)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resource_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    struct FailingStore;

    #[async_trait]
    impl DurableStore for FailingStore {
        async fn load_all(&self) -> Result<Vec<CacheEntry>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn put(&self, _entry: &CacheEntry) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn touch(&self, _key: &ResourceKey, _at: i64) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn delete(&self, _key: &ResourceKey) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_storage_failures_degrade_silently() {
        // Broken durable store: cache starts cold and keeps serving from
        // memory without surfacing errors
        let cache = ResourceCache::open(Arc::new(FailingStore), 100).await;

        cache.put(chapter_key(1), payload(10)).await;
        assert!(cache.get(&chapter_key(1)).await.is_some());

        cache.invalidate(&chapter_key(1)).await;
        assert!(cache.get(&chapter_key(1)).await.is_none());
    }
}
