//! Reading progress API routes
//!
//! The PUT handler is the server half of last-write-wins sync: the
//! repository keeps only strictly newer writes, and the response reports
//! whether this write was applied so a stale tab can resync.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};

use crate::db::{ProgressRepository, ProgressUpdate, ProgressUpsert, ReadingProgress};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the progress router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all_progress))
        .route("/:book_id", get(get_progress))
        .route("/:book_id", put(update_progress))
        .route("/:book_id", delete(delete_progress))
        .route("/recent/:limit", get(recent_progress))
}

/// List all progress
async fn list_all_progress(State(state): State<AppState>) -> Result<Json<Vec<ReadingProgress>>> {
    let repo = ProgressRepository::new(state.db());
    let progress = repo.list().await?;
    Ok(Json(progress))
}

/// Get progress for a specific book
async fn get_progress(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<ReadingProgress>> {
    let repo = ProgressRepository::new(state.db());
    let progress = repo
        .get(&book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No progress for book: {}", book_id)))?;
    Ok(Json(progress))
}

/// Update progress for a book
async fn update_progress(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<ProgressUpsert>> {
    let repo = ProgressRepository::new(state.db());
    let outcome = repo.upsert(&book_id, &update).await?;
    Ok(Json(outcome))
}

/// Delete progress for a book
async fn delete_progress(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<StatusCode> {
    let repo = ProgressRepository::new(state.db());
    let deleted = repo.delete(&book_id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No progress for book: {}",
            book_id
        )))
    }
}

/// Get recently read books
async fn recent_progress(
    State(state): State<AppState>,
    Path(limit): Path<i32>,
) -> Result<Json<Vec<ReadingProgress>>> {
    let repo = ProgressRepository::new(state.db());
    let progress = repo.recent(limit.min(100)).await?;
    Ok(Json(progress))
}
