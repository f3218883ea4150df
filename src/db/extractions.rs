//! Extraction result store
//!
//! Completed extraction payloads, shared across all readers. A caller that
//! lost the lease race reads the result the winning holder wrote here.

use sqlx::SqlitePool;

use crate::chapters::ChapterData;
use crate::error::Result;

/// Repository for completed chapter extractions
pub struct ExtractionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ExtractionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the results table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapter_descriptions (
                book_id TEXT NOT NULL,
                chapter_index INTEGER NOT NULL,
                payload TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                PRIMARY KEY (book_id, chapter_index)
            )
            "#,
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get a completed extraction, if any
    ///
    /// An undecodable payload is treated as absent and deleted.
    pub async fn get(&self, book_id: &str, chapter_index: u32) -> Result<Option<ChapterData>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM chapter_descriptions WHERE book_id = ? AND chapter_index = ?",
        )
        .bind(book_id)
        .bind(chapter_index as i64)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some((payload,)) => match serde_json::from_str::<ChapterData>(&payload) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    tracing::warn!(
                        "corrupt extraction payload for {}/{}: {}",
                        book_id,
                        chapter_index,
                        e
                    );
                    self.delete(book_id, chapter_index).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Store a completed extraction
    pub async fn put(&self, data: &ChapterData) -> Result<()> {
        let payload = serde_json::to_string(data)
            .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO chapter_descriptions (book_id, chapter_index, payload, generated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(book_id, chapter_index) DO UPDATE SET
                payload = excluded.payload,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(&data.book_id)
        .bind(data.chapter_index as i64)
        .bind(&payload)
        .bind(data.generated_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Drop a stored extraction (forces regeneration)
    pub async fn delete(&self, book_id: &str, chapter_index: u32) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM chapter_descriptions WHERE book_id = ? AND chapter_index = ?",
        )
        .bind(book_id)
        .bind(chapter_index as i64)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
