//! Database layer
//!
//! SQLite via sqlx. One pool shared across repositories; each repository
//! owns its schema and exposes typed operations.

mod extractions;
mod progress;

pub use extractions::ExtractionRepository;
pub use progress::{ProgressRepository, ProgressUpdate, ProgressUpsert, ReadingProgress};

use sqlx::SqlitePool;

use crate::error::Result;

/// Create the database pool and initialize all schemas
pub async fn create_pool(url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(url).await?;

    ProgressRepository::new(&pool).init().await?;
    ExtractionRepository::new(&pool).init().await?;

    Ok(pool)
}
