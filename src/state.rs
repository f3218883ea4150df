//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::coordinator::ExtractionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub db: SqlitePool,
    pub extraction: ExtractionService,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool, extraction: ExtractionService) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                extraction,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the extraction service
    pub fn extraction(&self) -> &ExtractionService {
        &self.inner.extraction
    }
}
