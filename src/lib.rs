//! pagepool - a buffer pool for disk-backed storage engines.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      BufferPoolManager                          │
//! │   fetch / unpin / new / delete / flush, one latch per call      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐  ┌─────────────────────┐               │
//! │  │ Page table          │  │ Replacer            │               │
//! │  │ ExtendibleHash      │  │ LruReplacer         │               │
//! │  │ PageId → FrameId    │  │ unpinned FrameIds   │               │
//! │  └─────────────────────┘  └─────────────────────┘               │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │ Frames: Vec<Frame>  (Page + page id, pins, dirty)        │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DiskManager (file / memory)        LogManager (optional)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool manager, frames, guards, replacer
//! - [`container`] - Extendible hash table
//! - [`storage`] - Disk manager contract and backends
//! - [`recovery`] - Write-ahead log hook
//!
//! # Quick Start
//! ```
//! use pagepool::storage::MemoryDiskManager;
//! use pagepool::BufferPoolManager;
//!
//! let bpm = BufferPoolManager::new(8, MemoryDiskManager::new());
//!
//! let page_id = {
//!     let mut guard = bpm.new_page_guarded().unwrap().expect("pool has room");
//!     guard.as_mut_slice()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//!
//! let guard = bpm.fetch_page_read(page_id).unwrap().expect("pool has room");
//! assert_eq!(&guard.as_slice()[..5], b"hello");
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod recovery;
pub mod storage;

pub use common::config::{BufferPoolConfig, DeletePolicy, PAGE_SIZE};
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use recovery::LogManager;
pub use storage::page::Page;
pub use storage::{DiskManager, FileDiskManager, MemoryDiskManager};
