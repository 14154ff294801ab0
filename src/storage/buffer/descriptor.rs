//! Per-frame bookkeeping.

use super::replacer::FrameId;
use crate::storage::disk::FileRef;
use crate::storage::page::{FileId, PageKey, PageNo};

/// The page currently held by a frame.
#[derive(Debug, Clone)]
pub struct Resident {
    pub file: FileRef,
    pub page_no: PageNo,
}

impl Resident {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.file.id(), self.page_no)
    }
}

/// State of one frame of the buffer pool.
///
/// An invalid descriptor is never dirty, never pinned and has no owner.
/// `set` and `clear` are the only transitions between the two states. Outside
/// this crate only the reference bit can be changed.
#[derive(Debug)]
pub struct FrameDescriptor {
    frame_id: FrameId,
    owner: Option<Resident>,
    valid: bool,
    dirty: bool,
    referenced: bool,
    pin_count: u32,
}

impl FrameDescriptor {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            owner: None,
            valid: false,
            dirty: false,
            referenced: false,
            pin_count: 0,
        }
    }

    /// Take ownership of a page that was just read in or allocated.
    pub(crate) fn set(&mut self, file: FileRef, page_no: PageNo) {
        self.owner = Some(Resident { file, page_no });
        self.valid = true;
        self.dirty = false;
        self.referenced = true;
        self.pin_count = 1;
    }

    pub(crate) fn clear(&mut self) {
        self.owner = None;
        self.valid = false;
        self.dirty = false;
        self.referenced = false;
        self.pin_count = 0;
    }

    pub(crate) fn pin(&mut self) {
        self.referenced = true;
        self.pin_count += 1;
    }

    /// Drop one pin. Returns false, changing nothing, if there was none.
    pub(crate) fn unpin(&mut self, mark_dirty: bool) -> bool {
        if self.pin_count == 0 {
            return false;
        }
        self.pin_count -= 1;
        if mark_dirty {
            self.dirty = true;
        }
        true
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn owner(&self) -> Option<&Resident> {
        self.owner.as_ref()
    }

    pub fn key(&self) -> Option<PageKey> {
        self.owner.as_ref().map(Resident::key)
    }

    pub fn belongs_to(&self, file: FileId) -> bool {
        self.owner.as_ref().is_some_and(|o| o.file.id() == file)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    pub fn clear_reference(&mut self) {
        self.referenced = false;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    /// Valid, unpinned and not recently referenced.
    pub fn is_evictable(&self) -> bool {
        self.valid && !self.referenced && self.pin_count == 0
    }

    #[cfg(test)]
    pub(crate) fn corrupt_validity(&mut self) {
        self.valid = false;
    }
}
