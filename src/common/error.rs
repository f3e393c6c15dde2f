//! Error types for pagepool.
//!
//! Pool exhaustion is *not* an error: `fetch_page`/`new_page` report it as
//! `Ok(None)`. Everything here is either a caller protocol violation or a
//! failure bubbling up from the disk manager or the log hook.

use thiserror::Error;

use super::PageId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagepool.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the disk manager.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The disk manager has no such page (never allocated, or deallocated).
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// The invalid sentinel was passed where a real page is required.
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    /// Refused to delete a page that still has active pins.
    #[error("{0} is still pinned")]
    PagePinned(PageId),

    /// The write-ahead log could not be flushed ahead of a page write.
    #[error("log flush failed: {0}")]
    Log(String),
}
