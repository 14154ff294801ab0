//! Storage layer error types.

use crate::storage::buffer::replacer::FrameId;
use crate::storage::page::PageKey;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool exceeded: every frame is pinned")]
    BufferExceeded,

    #[error("Page not resident in buffer pool: {0}")]
    PageNotResident(PageKey),

    #[error("Page is not pinned: {0}")]
    PageNotPinned(PageKey),

    #[error("Page is pinned: {0}")]
    PagePinned(PageKey),

    #[error("Inconsistent state in frame {frame_id}")]
    BadBuffer { frame_id: FrameId },

    #[error("Page table already has an entry for {0}")]
    DuplicateEntry(PageKey),

    #[error("Frame {frame_id} is no longer pinned for this page")]
    StaleHandle { frame_id: FrameId },

    #[error("Invalid buffer pool size: {0}")]
    InvalidPoolSize(usize),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
