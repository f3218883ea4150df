//! Chapter resources
//!
//! Provides:
//! - The resolved chapter data types (scene descriptions, artifacts)
//! - The extraction backend client contract and HTTP implementation
//! - The client-side chapter resource manager (cache-first, coalescing)

mod backend;
mod manager;
mod types;

pub use backend::{ChapterError, ExtractionBackend, HttpExtractionBackend};
pub use manager::ChapterResourceManager;
pub use types::{ChapterData, SceneDescription};
