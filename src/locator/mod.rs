//! Document locator module
//!
//! Provides parsing, generation, and resolution of portable reading locations.
//!
//! # Overview
//!
//! A locator is a compact, paragraph-granularity address into a reflowable
//! document that stays stable across re-renders and re-paginations. It pairs
//! with a fractional scroll offset to recover a pixel-exact position.
//!
//! # Example locator
//!
//! ```text
//! loc(/5/12:240)
//!     │ │   └── character offset 240 within the paragraph
//!     │ └────── paragraph index 12 within the chapter
//!     └──────── chapter (spine) index 5
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use crate::locator::{encode, decode, Locator};
//!
//! let position = encode(&live_location);
//! let decoded = decode(&position, &resolver);
//! if decoded.degraded {
//!     // anchor no longer exists, fell back to a nearby valid location
//! }
//! ```

mod encoder;
mod parser;
mod types;

pub use encoder::{decode, encode, AnchorResolver, DecodedLocation};
pub use parser::{parse, LocatorParseError};
pub use types::{LiveLocation, Locator, Position};
