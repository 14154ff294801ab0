use crate::storage::error::{StorageError, StorageResult};

/// Frames used when nothing else is configured.
pub const DEFAULT_NUM_FRAMES: usize = 64;

/// Construction parameters for a `BufferPoolManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of in-memory frames, each holding one page.
    pub num_frames: usize,
}

impl BufferPoolConfig {
    pub fn new(num_frames: usize) -> Self {
        Self { num_frames }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.num_frames == 0 || self.num_frames > u32::MAX as usize {
            return Err(StorageError::InvalidPoolSize(self.num_frames));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_FRAMES)
    }
}
