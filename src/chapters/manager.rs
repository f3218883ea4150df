//! Chapter resource manager
//!
//! Client-side orchestrator for chapter entry: consult the local resource
//! cache, and on a miss request extraction through the coordinator-backed
//! backend, then populate the cache.
//!
//! # Concurrency
//!
//! - Concurrent `ensure_chapter_ready` calls for the same chapter coalesce
//!   into one outstanding backend request; every waiter gets the result
//! - The fetch runs in a detached task, so a reader navigating away never
//!   aborts a request already shared with the coordinator; the result is
//!   still cached for later
//! - The cache is only ever updated with a single atomic `put` of the full
//!   payload, so an abandoned request cannot leave it half-written

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::{ResourceCache, ResourceKey};

use super::backend::{ChapterError, ExtractionBackend};
use super::types::ChapterData;

type FetchResult = Option<Result<ChapterData, ChapterError>>;

struct ManagerInner {
    book_id: String,
    cache: ResourceCache,
    backend: Arc<dyn ExtractionBackend>,
    inflight: parking_lot::Mutex<HashMap<u32, watch::Receiver<FetchResult>>>,
}

/// Ensures chapter resources are resident before the reader needs them
#[derive(Clone)]
pub struct ChapterResourceManager {
    inner: Arc<ManagerInner>,
}

impl ChapterResourceManager {
    pub fn new(
        book_id: impl Into<String>,
        cache: ResourceCache,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                book_id: book_id.into(),
                cache,
                backend,
                inflight: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether a chapter's descriptions are already cached
    pub fn is_ready(&self, chapter_index: u32) -> bool {
        self.inner
            .cache
            .contains(&self.descriptions_key(chapter_index))
    }

    /// Return chapter data, fetching and caching it if necessary
    pub async fn ensure_chapter_ready(
        &self,
        chapter_index: u32,
    ) -> Result<ChapterData, ChapterError> {
        let key = self.descriptions_key(chapter_index);

        if let Some(entry) = self.inner.cache.get(&key).await {
            match serde_json::from_slice::<ChapterData>(&entry.payload) {
                Ok(data) => return Ok(data),
                Err(e) => {
                    // Undecodable entry counts as corrupt: evict and refetch
                    tracing::warn!("corrupt cached payload for {}: {}", key, e);
                    self.inner.cache.invalidate(&key).await;
                }
            }
        }

        let mut rx = self.join_or_start_fetch(chapter_index);
        // The watch ref borrows rx; copy the result out before rx drops
        let outcome = match rx.wait_for(|result| result.is_some()).await {
            Ok(value) => value
                .clone()
                .unwrap_or_else(|| Err(ChapterError::Internal("empty fetch result".to_string()))),
            Err(_) => Err(ChapterError::Internal(
                "extraction task dropped before completing".to_string(),
            )),
        };
        outcome
    }

    /// Subscribe to the outstanding fetch for a chapter, starting one if none
    fn join_or_start_fetch(&self, chapter_index: u32) -> watch::Receiver<FetchResult> {
        let mut inflight = self.inner.inflight.lock();
        if let Some(rx) = inflight.get(&chapter_index) {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(chapter_index, rx.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner
                .backend
                .fetch_descriptions(&inner.book_id, chapter_index)
                .await;

            if let Ok(ref data) = result {
                match serde_json::to_vec(data) {
                    Ok(bytes) => {
                        let key =
                            ResourceKey::chapter_descriptions(&inner.book_id, chapter_index);
                        inner.cache.put(key, bytes).await;
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize chapter data: {}", e);
                    }
                }
            }

            // Cache is populated before the inflight slot clears, so a
            // caller arriving now hits the cache instead of refetching
            inner.inflight.lock().remove(&chapter_index);
            let _ = tx.send(Some(result));
        });

        rx
    }

    fn descriptions_key(&self, chapter_index: u32) -> ResourceKey {
        ResourceKey::chapter_descriptions(&self.inner.book_id, chapter_index)
    }
}
