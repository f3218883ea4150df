//! Reading progress database operations
//!
//! Progress rows are keyed per book. Concurrent tabs and devices write
//! without locks: every payload carries a monotonic client timestamp, and
//! the upsert keeps a row only when the incoming timestamp is strictly
//! newer than the stored one (last-write-wins).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

/// Reading progress record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReadingProgress {
    pub book_id: String,
    pub locator: String,
    pub scroll_offset: f64,
    pub chapter_index: i64,
    pub progress_percent: f64,
    pub device_id: Option<String>,
    pub client_ts: i64,
    pub updated_at: String,
}

/// Progress update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub locator: String,
    pub scroll_offset: f64,
    pub chapter_index: i64,
    pub progress_percent: f64,
    pub client_ts: i64,
    pub device_id: Option<String>,
}

/// Result of an upsert attempt
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpsert {
    /// False when the write was stale and the stored row was kept
    pub applied: bool,
    pub progress: ReadingProgress,
}

/// Progress repository
pub struct ProgressRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProgressRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the progress table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reading_progress (
                book_id TEXT PRIMARY KEY,
                locator TEXT NOT NULL,
                scroll_offset REAL NOT NULL,
                chapter_index INTEGER NOT NULL,
                progress_percent REAL NOT NULL,
                device_id TEXT,
                client_ts INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get progress for a specific book
    pub async fn get(&self, book_id: &str) -> Result<Option<ReadingProgress>> {
        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT book_id, locator, scroll_offset, chapter_index,
                   progress_percent, device_id, client_ts, updated_at
            FROM reading_progress
            WHERE book_id = ?
            "#,
        )
        .bind(book_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(progress)
    }

    /// List all progress, most recently updated first
    pub async fn list(&self) -> Result<Vec<ReadingProgress>> {
        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT book_id, locator, scroll_offset, chapter_index,
                   progress_percent, device_id, client_ts, updated_at
            FROM reading_progress
            ORDER BY client_ts DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(progress)
    }

    /// Update progress, keeping only strictly newer writes
    pub async fn upsert(&self, book_id: &str, update: &ProgressUpdate) -> Result<ProgressUpsert> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO reading_progress (
                book_id, locator, scroll_offset, chapter_index,
                progress_percent, device_id, client_ts, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(book_id) DO UPDATE SET
                locator = excluded.locator,
                scroll_offset = excluded.scroll_offset,
                chapter_index = excluded.chapter_index,
                progress_percent = excluded.progress_percent,
                device_id = excluded.device_id,
                client_ts = excluded.client_ts,
                updated_at = excluded.updated_at
            WHERE excluded.client_ts > reading_progress.client_ts
            "#,
        )
        .bind(book_id)
        .bind(&update.locator)
        .bind(update.scroll_offset)
        .bind(update.chapter_index)
        .bind(update.progress_percent)
        .bind(&update.device_id)
        .bind(update.client_ts)
        .bind(&now)
        .execute(self.pool)
        .await?;

        // rows_affected is the only reliable applied signal: a rejected
        // write with a client_ts equal to the stored one would otherwise
        // look applied
        let applied = result.rows_affected() > 0;

        let progress = self.get(book_id).await?.ok_or_else(|| {
            crate::error::AppError::Internal("Failed to fetch upserted progress".to_string())
        })?;

        Ok(ProgressUpsert { applied, progress })
    }

    /// Delete progress for a book
    pub async fn delete(&self, book_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reading_progress WHERE book_id = ?")
            .bind(book_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the most recently read books
    pub async fn recent(&self, limit: i32) -> Result<Vec<ReadingProgress>> {
        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT book_id, locator, scroll_offset, chapter_index,
                   progress_percent, device_id, client_ts, updated_at
            FROM reading_progress
            WHERE progress_percent > 0
            ORDER BY client_ts DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        ProgressRepository::new(&pool).init().await.unwrap();
        pool
    }

    fn update(locator: &str, client_ts: i64, device: &str) -> ProgressUpdate {
        ProgressUpdate {
            locator: locator.to_string(),
            scroll_offset: 0.25,
            chapter_index: 3,
            progress_percent: 40.0,
            client_ts,
            device_id: Some(device.to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        let outcome = repo
            .upsert("book-1", &update("loc(/3/1:0)", 1000, "tab-a"))
            .await
            .unwrap();
        assert!(outcome.applied);

        let stored = repo.get("book-1").await.unwrap().unwrap();
        assert_eq!(stored.locator, "loc(/3/1:0)");
        assert_eq!(stored.client_ts, 1000);
    }

    #[tokio::test]
    async fn test_newer_write_wins() {
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("book-1", &update("loc(/3/1:0)", 1000, "tab-a"))
            .await
            .unwrap();
        let outcome = repo
            .upsert("book-1", &update("loc(/3/9:0)", 2000, "tab-b"))
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.progress.locator, "loc(/3/9:0)");
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        // Two tabs race: T1 < T2, but T2 lands first. T1's write must not
        // clobber the newer state.
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("book-1", &update("loc(/4/2:0)", 2000, "tab-b"))
            .await
            .unwrap();
        let outcome = repo
            .upsert("book-1", &update("loc(/3/1:0)", 1000, "tab-a"))
            .await
            .unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.progress.locator, "loc(/4/2:0)");
        assert_eq!(outcome.progress.client_ts, 2000);
    }

    #[tokio::test]
    async fn test_equal_timestamp_is_stale() {
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("book-1", &update("loc(/1/1:0)", 1000, "tab-a"))
            .await
            .unwrap();
        let outcome = repo
            .upsert("book-1", &update("loc(/1/2:0)", 1000, "tab-b"))
            .await
            .unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.progress.locator, "loc(/1/1:0)");
    }

    #[tokio::test]
    async fn test_recent_orders_by_client_ts() {
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("book-1", &update("loc(/1/0:0)", 100, "d"))
            .await
            .unwrap();
        repo.upsert("book-2", &update("loc(/2/0:0)", 300, "d"))
            .await
            .unwrap();
        repo.upsert("book-3", &update("loc(/3/0:0)", 200, "d"))
            .await
            .unwrap();

        let recent = repo.recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|p| p.book_id.as_str()).collect();
        assert_eq!(ids, vec!["book-2", "book-3"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = setup_test_db().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("book-1", &update("loc(/1/0:0)", 100, "d"))
            .await
            .unwrap();
        assert!(repo.delete("book-1").await.unwrap());
        assert!(!repo.delete("book-1").await.unwrap());
        assert!(repo.get("book-1").await.unwrap().is_none());
    }
}
