//! Progress sinks
//!
//! The debounced writer persists through a [`ProgressSink`], keeping the
//! debounce logic independent of transport. The production sink PUTs to the
//! progress backend; tests substitute recording or failing sinks.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Progress payload sent to the backend
///
/// `client_ts` is a monotonic millisecond timestamp; the server persists the
/// payload only if it is strictly newer than the stored value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressWrite {
    #[serde(skip)]
    pub book_id: String,
    pub locator: String,
    pub scroll_offset: f64,
    pub chapter_index: u32,
    pub progress_percent: f64,
    pub client_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Progress persistence errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Progress backend unreachable: {0}")]
    Transport(String),

    #[error("Progress backend rejected write: status {0}")]
    Rejected(u16),
}

/// Destination for persisted positions
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn persist(&self, write: &ProgressWrite) -> Result<(), SyncError>;
}

/// HTTP sink targeting the progress backend
///
/// `PUT {base_url}/api/v1/progress/{book_id}`. A stale write (older
/// `client_ts` than the stored row) is a success from the sink's point of
/// view: the server reports it as not-applied rather than erroring.
pub struct HttpProgressSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn persist(&self, write: &ProgressWrite) -> Result<(), SyncError> {
        let url = format!(
            "{}/api/v1/progress/{}",
            self.base_url.trim_end_matches('/'),
            write.book_id
        );

        let response = self
            .client
            .put(&url)
            .json(write)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Rejected(response.status().as_u16()))
        }
    }
}

/// Base delay for transient-failure retries
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Persist with bounded exponential backoff on transient failures
pub(crate) async fn persist_with_retry(
    sink: &dyn ProgressSink,
    write: &ProgressWrite,
    attempts: u32,
) -> Result<(), SyncError> {
    let mut last_err = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
        }
        match sink.persist(write).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    "progress persist attempt {}/{} failed: {}",
                    attempt + 1,
                    attempts,
                    e
                );
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SyncError::Transport("no attempts made".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProgressSink for FlakySink {
        async fn persist(&self, _write: &ProgressWrite) -> Result<(), SyncError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(SyncError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn write() -> ProgressWrite {
        ProgressWrite {
            book_id: "book-1".to_string(),
            locator: "loc(/1/2:3)".to_string(),
            scroll_offset: 0.5,
            chapter_index: 1,
            progress_percent: 12.0,
            client_ts: 1000,
            device_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let sink = FlakySink {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };

        persist_with_retry(&sink, &write(), 3).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_budget() {
        let sink = FlakySink {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        };

        let err = persist_with_retry(&sink, &write(), 3).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }
}
