//! Extraction backend client
//!
//! The client-facing contract of the server-side extraction coordinator.
//! The request may block while the server coordinates with other readers;
//! the response is the resolved chapter data either way, whether freshly
//! extracted here or served from a concurrent in-flight job.

use async_trait::async_trait;
use thiserror::Error;

use super::types::ChapterData;

/// Chapter resource errors
///
/// Clone-able so a single failure can fan out to every coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum ChapterError {
    /// The extraction job itself failed upstream; retryable
    #[error("Extraction failed for chapter {chapter_index}: {message}")]
    ExtractionFailed {
        chapter_index: u32,
        message: String,
    },

    /// The coordinator could not serve the request in time; retryable
    #[error("Extraction busy for chapter {chapter_index}, retry later")]
    Busy { chapter_index: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Client contract for requesting chapter extraction
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn fetch_descriptions(
        &self,
        book_id: &str,
        chapter_index: u32,
    ) -> Result<ChapterData, ChapterError>;
}

/// HTTP client for the extraction endpoint
///
/// `POST {base_url}/api/v1/books/{book_id}/chapters/{index}/descriptions?extract=true`
pub struct HttpExtractionBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractionBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ExtractionBackend for HttpExtractionBackend {
    async fn fetch_descriptions(
        &self,
        book_id: &str,
        chapter_index: u32,
    ) -> Result<ChapterData, ChapterError> {
        let url = format!(
            "{}/api/v1/books/{}/chapters/{}/descriptions?extract=true",
            self.base_url.trim_end_matches('/'),
            book_id,
            chapter_index
        );

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ChapterError::Internal(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<ChapterData>()
                .await
                .map_err(|e| ChapterError::Internal(e.to_string())),
            503 => Err(ChapterError::Busy { chapter_index }),
            status => Err(ChapterError::ExtractionFailed {
                chapter_index,
                message: format!("status {}", status),
            }),
        }
    }
}
