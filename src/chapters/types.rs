//! Chapter resource types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted scene description within a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Paragraph the scene is anchored to
    pub paragraph_index: u32,
    /// Extracted description text
    pub text: String,
    /// Generated illustration for this scene, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Resolved chapter data: the payload of a completed extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterData {
    pub book_id: String,
    pub chapter_index: u32,
    pub descriptions: Vec<SceneDescription>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_data_json_round_trip() {
        let data = ChapterData {
            book_id: "book-1".to_string(),
            chapter_index: 4,
            descriptions: vec![SceneDescription {
                paragraph_index: 2,
                text: "A storm gathers over the moor".to_string(),
                image_url: Some("https://img.example/abc.png".to_string()),
            }],
            generated_at: Utc::now(),
        };

        let bytes = serde_json::to_vec(&data).unwrap();
        let back: ChapterData = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, data);
    }
}
