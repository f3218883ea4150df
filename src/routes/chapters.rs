//! Chapter description API routes

use axum::{
    extract::{Path, Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::chapters::ChapterData;
use crate::db::ExtractionRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct DescriptionsQuery {
    /// When false, only return an already-stored result
    #[serde(default = "default_true")]
    pub extract: bool,
}

/// Create the chapters router, nested under /api/v1/books
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/:book_id/chapters/:chapter_index/descriptions",
        post(chapter_descriptions),
    )
}

/// Get scene descriptions for a chapter, extracting them on a miss
///
/// Extraction is lease-coordinated: concurrent requests for the same
/// chapter run one job and share its result.
async fn chapter_descriptions(
    State(state): State<AppState>,
    Path((book_id, chapter_index)): Path<(String, u32)>,
    Query(query): Query<DescriptionsQuery>,
) -> Result<Json<ChapterData>> {
    if !query.extract {
        let repo = ExtractionRepository::new(state.db());
        let data = repo.get(&book_id, chapter_index).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "No stored descriptions for {}/{}",
                book_id, chapter_index
            ))
        })?;
        return Ok(Json(data));
    }

    let data = state
        .extraction()
        .descriptions(&book_id, chapter_index)
        .await
        .map_err(AppError::from)?;
    Ok(Json(data))
}
