//! Coordinated extraction service
//!
//! Wraps the extraction backend in the lease protocol: exactly one holder
//! runs the job while contending callers wait on the shared result store.
//!
//! # Flow
//!
//! 1. Read the result store; a completed extraction short-circuits.
//! 2. Try to acquire the per-chapter lease.
//! 3. As holder: re-check the store (a previous holder may have finished
//!    between our read and the acquire), run the extractor, persist the
//!    result, release.
//! 4. On `Busy`: sleep with exponential backoff, re-read the store, and
//!    repeat until the wait budget runs out.
//!
//! A failed extraction releases the lease immediately so retries do not
//! have to wait out the TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::chapters::{ChapterData, SceneDescription};
use crate::db::ExtractionRepository;
use crate::error::AppError;

use super::lease::{AcquireOutcome, LeaseCoordinator, LeaseError, LeaseToken};

/// Extraction service errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The extraction job itself failed; the lease was released early
    #[error("Extraction job failed for chapter {chapter_index}: {message}")]
    Job { chapter_index: u32, message: String },

    /// Waited out the full backoff budget without the holder finishing
    #[error("Timed out waiting for chapter {chapter_index} extraction")]
    WaitTimeout { chapter_index: u32 },

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Job { message, .. } => AppError::ExtractionFailed(message),
            ExtractError::WaitTimeout { chapter_index } => AppError::Busy(format!(
                "chapter {} extraction still in progress",
                chapter_index
            )),
            ExtractError::Lease(e) => AppError::Internal(e.to_string()),
            ExtractError::Storage(e) => e,
        }
    }
}

/// The expensive per-chapter job the coordinator serializes
#[async_trait]
pub trait DescriptionExtractor: Send + Sync {
    async fn extract(
        &self,
        book_id: &str,
        chapter_index: u32,
    ) -> anyhow::Result<Vec<SceneDescription>>;
}

/// Backoff schedule for callers that find the lease busy
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// First wait after observing `Busy`
    pub initial: Duration,
    /// Cap on any single wait
    pub max: Duration,
    /// Total time a caller is willing to wait before giving up
    pub budget: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(2),
            budget: Duration::from_secs(30),
        }
    }
}

/// Lease-coordinated chapter description extraction
#[derive(Clone)]
pub struct ExtractionService {
    pool: SqlitePool,
    lease: LeaseCoordinator,
    extractor: Arc<dyn DescriptionExtractor>,
    backoff: BackoffPolicy,
}

impl ExtractionService {
    pub fn new(
        pool: SqlitePool,
        lease: LeaseCoordinator,
        extractor: Arc<dyn DescriptionExtractor>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            pool,
            lease,
            extractor,
            backoff,
        }
    }

    fn lock_key(book_id: &str, chapter_index: u32) -> String {
        format!("extract:{}:{}", book_id, chapter_index)
    }

    /// Get chapter descriptions, extracting them if no stored result exists
    pub async fn descriptions(
        &self,
        book_id: &str,
        chapter_index: u32,
    ) -> Result<ChapterData, ExtractError> {
        let repo = ExtractionRepository::new(&self.pool);

        if let Some(data) = repo.get(book_id, chapter_index).await? {
            return Ok(data);
        }

        let lock_key = Self::lock_key(book_id, chapter_index);
        let mut delay = self.backoff.initial;
        let mut waited = Duration::ZERO;

        loop {
            match self.lease.try_acquire(&lock_key).await? {
                AcquireOutcome::Acquired(token) => {
                    // A previous holder may have finished between our first
                    // read and the acquire
                    if let Some(data) = repo.get(book_id, chapter_index).await? {
                        self.lease.release(&lock_key, &token).await?;
                        return Ok(data);
                    }

                    return self
                        .run_extraction(&repo, book_id, chapter_index, &lock_key, &token)
                        .await;
                }
                AcquireOutcome::Busy => {
                    if waited >= self.backoff.budget {
                        return Err(ExtractError::WaitTimeout { chapter_index });
                    }
                    tracing::debug!(
                        "extraction lock busy for {}, backing off {:?}",
                        lock_key,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                    delay = (delay * 2).min(self.backoff.max);

                    // The active holder publishes here when it finishes
                    if let Some(data) = repo.get(book_id, chapter_index).await? {
                        return Ok(data);
                    }
                }
            }
        }
    }

    async fn run_extraction(
        &self,
        repo: &ExtractionRepository<'_>,
        book_id: &str,
        chapter_index: u32,
        lock_key: &str,
        token: &LeaseToken,
    ) -> Result<ChapterData, ExtractError> {
        tracing::info!("extracting descriptions for {}/{}", book_id, chapter_index);

        let descriptions = match self.extractor.extract(book_id, chapter_index).await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                // Release before returning so retries do not wait out the TTL
                self.lease.release(lock_key, token).await?;
                return Err(ExtractError::Job {
                    chapter_index,
                    message: e.to_string(),
                });
            }
        };

        let data = ChapterData {
            book_id: book_id.to_string(),
            chapter_index,
            descriptions,
            generated_at: Utc::now(),
        };

        let stored = repo.put(&data).await;
        self.lease.release(lock_key, token).await?;
        stored?;

        Ok(data)
    }
}
