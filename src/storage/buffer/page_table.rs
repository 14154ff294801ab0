use super::replacer::FrameId;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Maps resident pages to the frame holding them.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: DashMap<PageKey, FrameId>,
}

impl PageTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }

    pub fn lookup(&self, key: &PageKey) -> Option<FrameId> {
        self.entries.get(key).map(|e| *e.value())
    }

    /// Fails with `DuplicateEntry` if the key is already mapped.
    pub fn insert(&self, key: PageKey, frame_id: FrameId) -> StorageResult<()> {
        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(StorageError::DuplicateEntry(key)),
            Entry::Vacant(slot) => {
                slot.insert(frame_id);
                Ok(())
            }
        }
    }

    pub fn remove(&self, key: &PageKey) -> Option<FrameId> {
        self.entries.remove(key).map(|(_, frame_id)| frame_id)
    }
}
