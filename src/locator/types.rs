//! Locator and position types
//!
//! A `Locator` addresses a paragraph inside a chapter; a `Position` wraps the
//! serialized locator together with the fine-grained scroll offset and the
//! overall progress fraction reported by the rendering engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A paragraph-granularity address into a document
///
/// Serialized form: `loc(/{chapter}/{paragraph}:{offset})`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Chapter (spine) index, 0-based
    pub chapter: u32,
    /// Paragraph index within the chapter, 0-based
    pub paragraph: u32,
    /// Character offset within the paragraph
    pub offset: u32,
}

impl Locator {
    /// Create a locator pointing at the start of a chapter
    pub fn chapter_start(chapter: u32) -> Self {
        Self {
            chapter,
            paragraph: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc(/{}/{}:{})", self.chapter, self.paragraph, self.offset)
    }
}

/// A live position reported by the rendering engine
///
/// This is the engine's own coordinate system: chapter + paragraph + character
/// offset, plus the layout-dependent refinements (scroll fraction within the
/// anchor's viewport and overall progress) that only the engine can compute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveLocation {
    pub chapter_index: u32,
    pub paragraph_index: u32,
    pub char_offset: u32,
    /// Scroll offset within the anchor's viewport, 0.0..=1.0
    pub scroll_offset: f64,
    /// Overall progress through the book, 0.0..=100.0
    pub progress_percent: f64,
}

impl LiveLocation {
    /// A location at the very start of a chapter
    pub fn chapter_start(chapter_index: u32) -> Self {
        Self {
            chapter_index,
            paragraph_index: 0,
            char_offset: 0,
            scroll_offset: 0.0,
            progress_percent: 0.0,
        }
    }
}

/// A portable reading position
///
/// Created on every navigation/scroll settle event and superseded by the next
/// one; the sync writer persists only the latest within a debounce window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Serialized locator (opaque to everything except the encoder)
    pub locator: String,
    /// Scroll offset within the anchor's viewport, 0.0..=1.0
    pub scroll_offset: f64,
    /// Chapter (spine) index the locator points into
    pub chapter_index: u32,
    /// Overall progress through the book, 0.0..=100.0
    pub progress_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        let loc = Locator {
            chapter: 5,
            paragraph: 12,
            offset: 240,
        };
        assert_eq!(loc.to_string(), "loc(/5/12:240)");
    }

    #[test]
    fn test_chapter_start() {
        let loc = Locator::chapter_start(3);
        assert_eq!(loc.to_string(), "loc(/3/0:0)");
    }
}
