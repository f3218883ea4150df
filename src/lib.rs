//! Lectern
//!
//! Reading-state synchronization and chapter-resource caching for
//! self-hosted ebook readers.
//!
//! The server half exposes the progress sync and coordinated extraction
//! APIs; the client half (locator, tracker, sync writer, cache, prefetch,
//! session) is the embeddable reading-state engine those APIs serve.

pub mod cache;
pub mod chapters;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod locator;
pub mod prefetch;
pub mod routes;
pub mod session;
pub mod state;
pub mod sync;
pub mod tracker;
