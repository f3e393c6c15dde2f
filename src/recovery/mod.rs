//! Write-ahead logging hook.
//!
//! The buffer pool does not produce log records itself. It only needs to
//! know that whatever the log manager has buffered is durable before a page
//! image reaches the disk manager, so that is the whole contract.

use crate::common::Result;

/// A write-ahead log the buffer pool must flush ahead of page writes.
///
/// Pools built without one (`None`) skip the call entirely.
pub trait LogManager: Send + Sync {
    /// Make every log record buffered so far durable.
    fn flush(&self) -> Result<()>;
}
