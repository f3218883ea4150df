//! Position encoding and resolution
//!
//! Converts between the rendering engine's live coordinates and portable
//! [`Position`] values. Encoding is lossless; decoding resolves a stored
//! locator against the *current* document structure and therefore degrades
//! gracefully when the document was re-parsed or rebuilt between sessions:
//! a locator that no longer resolves falls back to the nearest valid anchor
//! (or the chapter start) and flags the result as degraded instead of failing.

use super::parser::parse;
use super::types::{LiveLocation, Locator, Position};

/// Resolves locator anchors against the current document structure
///
/// Implemented by the rendering engine adapter; the encoder only asks the
/// questions it needs to validate an anchor.
pub trait AnchorResolver {
    /// Number of chapters in the document's spine
    fn chapter_count(&self) -> u32;

    /// Number of paragraph anchors in a chapter, if the chapter exists
    fn paragraph_count(&self, chapter: u32) -> Option<u32>;
}

/// Result of resolving a stored position
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLocation {
    /// The resolved (possibly adjusted) live location
    pub location: LiveLocation,
    /// True if the stored anchor no longer existed and a fallback was used
    pub degraded: bool,
}

/// Encode a live rendering-engine location into a portable position
pub fn encode(live: &LiveLocation) -> Position {
    let locator = Locator {
        chapter: live.chapter_index,
        paragraph: live.paragraph_index,
        offset: live.char_offset,
    };

    Position {
        locator: locator.to_string(),
        scroll_offset: live.scroll_offset.clamp(0.0, 1.0),
        chapter_index: live.chapter_index,
        progress_percent: live.progress_percent.clamp(0.0, 100.0),
    }
}

/// Decode a stored position against the current document structure
///
/// Never fails. Resolution falls through three levels:
/// 1. the exact anchor, when it still exists
/// 2. the nearest valid anchor in the same chapter (clamped paragraph index)
/// 3. the start of the position's chapter, clamped into the current spine
///
/// Levels 2 and 3 set `degraded`, so callers can tell the reader the position
/// was approximated without ever blocking on it.
pub fn decode(position: &Position, resolver: &dyn AnchorResolver) -> DecodedLocation {
    let chapters = resolver.chapter_count();
    if chapters == 0 {
        // Empty document, nothing to resolve against
        return DecodedLocation {
            location: LiveLocation::chapter_start(0),
            degraded: true,
        };
    }

    let locator = match parse(&position.locator) {
        Ok(loc) => loc,
        Err(e) => {
            tracing::debug!("unresolvable locator '{}': {}", position.locator, e);
            let chapter = position.chapter_index.min(chapters - 1);
            return DecodedLocation {
                location: fallback_location(chapter, position),
                degraded: true,
            };
        }
    };

    let chapter = locator.chapter.min(chapters - 1);
    let clamped_chapter = chapter != locator.chapter;

    match resolver.paragraph_count(chapter) {
        Some(paragraphs) if paragraphs > 0 => {
            if !clamped_chapter && locator.paragraph < paragraphs {
                // Exact anchor still exists
                DecodedLocation {
                    location: LiveLocation {
                        chapter_index: chapter,
                        paragraph_index: locator.paragraph,
                        char_offset: locator.offset,
                        scroll_offset: position.scroll_offset.clamp(0.0, 1.0),
                        progress_percent: position.progress_percent.clamp(0.0, 100.0),
                    },
                    degraded: false,
                }
            } else {
                // Nearest valid anchor in the (possibly clamped) chapter.
                // The character offset is meaningless in a different
                // paragraph, so it resets.
                DecodedLocation {
                    location: LiveLocation {
                        chapter_index: chapter,
                        paragraph_index: locator.paragraph.min(paragraphs - 1),
                        char_offset: 0,
                        scroll_offset: position.scroll_offset.clamp(0.0, 1.0),
                        progress_percent: position.progress_percent.clamp(0.0, 100.0),
                    },
                    degraded: true,
                }
            }
        }
        _ => DecodedLocation {
            location: fallback_location(chapter, position),
            degraded: true,
        },
    }
}

fn fallback_location(chapter: u32, position: &Position) -> LiveLocation {
    LiveLocation {
        chapter_index: chapter,
        paragraph_index: 0,
        char_offset: 0,
        scroll_offset: 0.0,
        progress_percent: position.progress_percent.clamp(0.0, 100.0),
    }
}
