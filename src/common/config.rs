//! Configuration for pagepool.

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so a frame can be handed to
/// the disk manager without any re-blocking.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages addressable with a u32 PageId (the last value is
/// reserved for [`PageId::INVALID`](crate::PageId::INVALID)).
pub const MAX_PAGES: u64 = u32::MAX as u64;

/// Frames in a pool built with [`BufferPoolConfig::default`].
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Entries per page-table bucket before it splits.
pub const DEFAULT_BUCKET_SIZE: usize = 50;

/// What `delete_page` does when the page is still pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse with [`Error::PagePinned`](crate::Error::PagePinned) and leave
    /// every structure untouched.
    #[default]
    RejectPinned,
    /// Delete anyway. Outstanding pins are discarded and the frame goes back
    /// to the free list; holders must not touch it again.
    Permissive,
}

/// Construction parameters for a [`BufferPoolManager`](crate::BufferPoolManager).
///
/// # Example
/// ```
/// use pagepool::common::config::{BufferPoolConfig, DeletePolicy};
///
/// let config = BufferPoolConfig::default()
///     .with_pool_size(64)
///     .with_delete_policy(DeletePolicy::Permissive);
/// assert_eq!(config.pool_size, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames. Must be > 0.
    pub pool_size: usize,
    /// Page-table bucket capacity. Must be > 0.
    pub bucket_size: usize,
    pub delete_policy: DeletePolicy,
}

impl BufferPoolConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            bucket_size: DEFAULT_BUCKET_SIZE,
            delete_policy: DeletePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_default_config() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.bucket_size, DEFAULT_BUCKET_SIZE);
        assert_eq!(config.delete_policy, DeletePolicy::RejectPinned);
    }

    #[test]
    fn test_config_setters() {
        let config = BufferPoolConfig::default()
            .with_pool_size(3)
            .with_bucket_size(2)
            .with_delete_policy(DeletePolicy::Permissive);

        assert_eq!(config.pool_size, 3);
        assert_eq!(config.bucket_size, 2);
        assert_eq!(config.delete_policy, DeletePolicy::Permissive);
    }
}
