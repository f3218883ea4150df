//! Resource cache types

use std::fmt;

/// Kind of cached resource
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ResourceKind {
    /// Raw chapter content
    ChapterContent,
    /// AI-extracted scene descriptions for a chapter
    ChapterDescriptions,
    /// Generated image artifact
    GeneratedImage,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ChapterContent => "content",
            ResourceKind::ChapterDescriptions => "descriptions",
            ResourceKind::GeneratedImage => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content" => Some(ResourceKind::ChapterContent),
            "descriptions" => Some(ResourceKind::ChapterDescriptions),
            "image" => Some(ResourceKind::GeneratedImage),
            _ => None,
        }
    }
}

/// Cache key: resource kind plus resource id
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Key for a chapter's extracted descriptions
    pub fn chapter_descriptions(book_id: &str, chapter_index: u32) -> Self {
        Self::new(
            ResourceKind::ChapterDescriptions,
            format!("{}/{}", book_id, chapter_index),
        )
    }

    /// Key for a chapter's content
    pub fn chapter_content(book_id: &str, chapter_index: u32) -> Self {
        Self::new(
            ResourceKind::ChapterContent,
            format!("{}/{}", book_id, chapter_index),
        )
    }

    /// Key for a generated image artifact
    pub fn generated_image(image_id: &str) -> Self {
        Self::new(ResourceKind::GeneratedImage, image_id)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// A resident cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResourceKey,
    pub payload: Vec<u8>,
    pub size_bytes: u64,
    /// Millisecond unix timestamp of creation
    pub created_at: i64,
    /// Millisecond unix timestamp of the most recent access
    pub last_accessed_at: i64,
}
