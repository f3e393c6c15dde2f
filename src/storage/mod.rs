//! Storage layer - the disk manager boundary and page format.
//!
//! - [`DiskManager`] - The persistence contract the buffer pool consumes
//! - [`FileDiskManager`] - Single-file backend
//! - [`MemoryDiskManager`] - Heap-backed backend for tests and scratch pools
//! - [`page`] - Page layout

mod disk_manager;
mod memory_disk_manager;
pub mod page;

pub use disk_manager::{DiskManager, FileDiskManager};
pub use memory_disk_manager::MemoryDiskManager;

#[cfg(test)]
pub use disk_manager::MockDiskManager;
