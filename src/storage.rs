//! Storage layer implementation for clockpool.
//!
//! This module provides a page cache in front of page-oriented files. Key
//! components:
//!
//! - **Page**: Fixed-size (8KB) blocks of data, the basic unit of I/O
//! - **PageFile**: A backing file that reads, writes, allocates and disposes pages
//! - **BufferPoolManager**: Bounded set of in-memory frames with clock replacement
//!
//! Every frame has a descriptor tracking the page it holds, its pin count and
//! its dirty and reference bits. Pinned pages are never evicted; dirty pages
//! are written back before their frame is reused.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::config::BufferPoolConfig;
pub use buffer::{BufferPoolManager, PageHandle};
pub use disk::{FileRef, MemoryPageFile, PageFile, PageManager};
pub use error::{StorageError, StorageResult};
pub use page::{FileId, PageKey, PageNo, PAGE_SIZE};
