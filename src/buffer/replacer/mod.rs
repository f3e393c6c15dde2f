//! Eviction policy (replacer).
//!
//! - [`LruReplacer`] - Least recently unpinned goes first

mod lru;

pub use lru::LruReplacer;
