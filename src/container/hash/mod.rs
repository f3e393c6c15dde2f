//! Hash-based containers.
//!
//! - [`ExtendibleHash`] - Directory-doubling hash table, used as the buffer
//!   pool's page table

mod extendible_hash;

pub use extendible_hash::{DefaultBuildHasher, ExtendibleHash, DEFAULT_MAX_DEPTH};
