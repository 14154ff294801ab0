pub mod config;
pub mod descriptor;
pub mod page_table;
pub mod replacer;

use crate::storage::disk::FileRef;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageKey, PageNo};
use crate::storage::PAGE_SIZE;
use config::BufferPoolConfig;
use descriptor::FrameDescriptor;
use log::{debug, trace, warn};
use page_table::PageTable;
use parking_lot::{Mutex, RwLock};
use replacer::{ClockReplacer, FrameId, Replacer, Victim};
use std::io;
use std::sync::Arc;

type FrameData = RwLock<Box<[u8; PAGE_SIZE]>>;

/// Caller's claim on a pinned page.
///
/// The handle is only a frame number plus the page it was issued for; the
/// bytes are reached through `BufferPoolManager::read` and
/// `BufferPoolManager::write`, which reject the handle once the page has lost
/// its last pin or left the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHandle {
    frame_id: FrameId,
    key: PageKey,
}

impl PageHandle {
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn page_no(&self) -> PageNo {
        self.key.page_no
    }
}

/// Page cache shared by every file of the storage engine.
///
/// Cloning is cheap and every clone sees the same frames. Dirty pages still
/// resident when the last clone is dropped are written back on a best-effort
/// basis.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    frames: Vec<FrameData>,
    // The page table is only modified while `table` is locked.
    table: Mutex<FrameTable>,
    page_table: PageTable,
}

struct FrameTable {
    descriptors: Vec<FrameDescriptor>,
    replacer: Box<dyn Replacer>,
}

impl BufferPoolManager {
    pub fn new(config: BufferPoolConfig) -> StorageResult<Self> {
        Self::with_replacer(config, Box::new(ClockReplacer::new()))
    }

    pub fn with_replacer(
        config: BufferPoolConfig,
        replacer: Box<dyn Replacer>,
    ) -> StorageResult<Self> {
        config.validate()?;
        let num_frames = config.num_frames;

        let frames = (0..num_frames)
            .map(|_| RwLock::new(Box::new([0u8; PAGE_SIZE])))
            .collect();
        let descriptors = (0..num_frames as FrameId)
            .map(FrameDescriptor::new)
            .collect();

        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                frames,
                table: Mutex::new(FrameTable {
                    descriptors,
                    replacer,
                }),
                page_table: PageTable::with_capacity(num_frames),
            }),
        })
    }

    pub fn num_frames(&self) -> usize {
        self.inner.frames.len()
    }

    /// Pin a page, reading it from `file` if it is not cached yet.
    pub fn fetch_page(&self, file: &FileRef, page_no: PageNo) -> StorageResult<PageHandle> {
        let key = PageKey::new(file.id(), page_no);
        let mut table = self.inner.table.lock();

        if let Some(frame_id) = self.inner.page_table.lookup(&key) {
            table.descriptors[frame_id as usize].pin();
            trace!("hit {} in frame {}", key, frame_id);
            return Ok(PageHandle { frame_id, key });
        }

        let frame_id = self.inner.allocate_frame(&mut table)?;
        {
            let mut data = self.inner.frames[frame_id as usize].write();
            file.read_page(page_no, &mut data[..])?;
        }
        self.inner.page_table.insert(key, frame_id)?;
        table.descriptors[frame_id as usize].set(file.clone(), page_no);
        debug!("read {} into frame {}", key, frame_id);

        Ok(PageHandle { frame_id, key })
    }

    /// Release one pin on a page. `mark_dirty` schedules it for write-back;
    /// a dirty page stays dirty until it has been written.
    pub fn unpin_page(
        &self,
        file: &FileRef,
        page_no: PageNo,
        mark_dirty: bool,
    ) -> StorageResult<()> {
        let key = PageKey::new(file.id(), page_no);
        let mut table = self.inner.table.lock();

        let frame_id = self
            .inner
            .page_table
            .lookup(&key)
            .ok_or(StorageError::PageNotResident(key))?;

        if !table.descriptors[frame_id as usize].unpin(mark_dirty) {
            return Err(StorageError::PageNotPinned(key));
        }
        Ok(())
    }

    /// Allocate a page in `file` and pin a zeroed frame for it.
    ///
    /// If no frame can be found the page stays allocated in the file but is
    /// not cached.
    pub fn allocate_page(&self, file: &FileRef) -> StorageResult<(PageNo, PageHandle)> {
        let page_no = file.allocate_page()?;
        let key = PageKey::new(file.id(), page_no);
        let mut table = self.inner.table.lock();

        let frame_id = self.inner.allocate_frame(&mut table)?;
        self.inner.frames[frame_id as usize].write().fill(0);
        self.inner.page_table.insert(key, frame_id)?;
        table.descriptors[frame_id as usize].set(file.clone(), page_no);
        debug!("allocated {} in frame {}", key, frame_id);

        Ok((page_no, PageHandle { frame_id, key }))
    }

    /// Drop a page from the pool and release it in `file`.
    ///
    /// The cached copy is discarded even if it is pinned or dirty; any
    /// outstanding handle to it becomes stale.
    pub fn dispose_page(&self, file: &FileRef, page_no: PageNo) -> StorageResult<()> {
        let key = PageKey::new(file.id(), page_no);
        let mut table = self.inner.table.lock();

        if let Some(frame_id) = self.inner.page_table.remove(&key) {
            let desc = &mut table.descriptors[frame_id as usize];
            if desc.is_pinned() {
                warn!(
                    "disposing {} with {} outstanding pins in frame {}",
                    key,
                    desc.pin_count(),
                    frame_id
                );
            }
            desc.clear();
            debug!("disposed {} from frame {}", key, frame_id);
        }

        file.dispose_page(page_no)?;
        Ok(())
    }

    /// Write back and evict every cached page of `file`.
    ///
    /// Fails with `PagePinned` as soon as a pinned page of the file is met.
    /// Pages handled before that point stay evicted.
    pub fn flush_file(&self, file: &FileRef) -> StorageResult<()> {
        let file_id = file.id();
        let mut table = self.inner.table.lock();

        for desc in table.descriptors.iter_mut() {
            if !desc.belongs_to(file_id) {
                continue;
            }
            let frame_id = desc.frame_id();
            let Some(key) = desc.key() else {
                continue;
            };
            if !desc.is_valid() {
                return Err(StorageError::BadBuffer { frame_id });
            }
            if desc.is_pinned() {
                return Err(StorageError::PagePinned(key));
            }

            if desc.is_dirty() {
                self.inner.write_back(desc)?;
                desc.mark_clean();
            }
            self.inner.page_table.remove(&key);
            desc.clear();
        }

        debug!("flushed {}", file_id);
        Ok(())
    }

    /// Write a cached page back if it is dirty. The page stays cached.
    pub fn flush_page(&self, file: &FileRef, page_no: PageNo) -> StorageResult<()> {
        let key = PageKey::new(file.id(), page_no);
        let mut table = self.inner.table.lock();

        if let Some(frame_id) = self.inner.page_table.lookup(&key) {
            let desc = &mut table.descriptors[frame_id as usize];
            if desc.is_dirty() {
                self.inner.write_back(desc)?;
                desc.mark_clean();
            }
        }
        Ok(())
    }

    /// Write back every dirty page without evicting anything.
    ///
    /// All pages are attempted; the first failure is returned.
    pub fn flush_all(&self) -> StorageResult<()> {
        let mut table = self.inner.table.lock();
        match self.inner.flush_dirty(&mut table).into_iter().next() {
            Some((_, err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn read<R>(
        &self,
        handle: &PageHandle,
        f: impl FnOnce(&[u8; PAGE_SIZE]) -> R,
    ) -> StorageResult<R> {
        let table = self.inner.table.lock();
        Self::check_handle(&table, handle)?;
        let data = self.inner.frames[handle.frame_id as usize].read();
        drop(table);

        Ok(f(&**data))
    }

    /// Modify a pinned page in place. This does not mark the page dirty;
    /// pass `mark_dirty` to `unpin_page` for that.
    pub fn write<R>(
        &self,
        handle: &PageHandle,
        f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R,
    ) -> StorageResult<R> {
        let table = self.inner.table.lock();
        Self::check_handle(&table, handle)?;
        let mut data = self.inner.frames[handle.frame_id as usize].write();
        drop(table);

        Ok(f(&mut **data))
    }

    pub fn is_resident(&self, file: &FileRef, page_no: PageNo) -> bool {
        let _table = self.inner.table.lock();
        self.inner
            .page_table
            .lookup(&PageKey::new(file.id(), page_no))
            .is_some()
    }

    /// Pin count of a cached page, or None if it is not cached.
    pub fn pin_count(&self, file: &FileRef, page_no: PageNo) -> Option<u32> {
        let table = self.inner.table.lock();
        self.inner
            .page_table
            .lookup(&PageKey::new(file.id(), page_no))
            .map(|frame_id| table.descriptors[frame_id as usize].pin_count())
    }

    fn check_handle(table: &FrameTable, handle: &PageHandle) -> StorageResult<()> {
        let live = table
            .descriptors
            .get(handle.frame_id as usize)
            .is_some_and(|d| d.is_valid() && d.is_pinned() && d.key() == Some(handle.key));
        if !live {
            return Err(StorageError::StaleHandle {
                frame_id: handle.frame_id,
            });
        }
        Ok(())
    }
}

impl BufferPoolInner {
    /// Find a frame for a new page, evicting the clock victim if needed.
    fn allocate_frame(&self, table: &mut FrameTable) -> StorageResult<FrameId> {
        let FrameTable {
            descriptors,
            replacer,
        } = table;

        let victim = replacer.select_victim(descriptors).ok_or_else(|| {
            debug!("no evictable frame among {}", descriptors.len());
            StorageError::BufferExceeded
        })?;

        // The pick must agree with the frame state, whichever replacer made it.
        let frame_id = victim.frame_id();
        let desc = descriptors
            .get_mut(frame_id as usize)
            .ok_or(StorageError::BadBuffer { frame_id })?;
        match victim {
            Victim::Free(_) if !desc.is_valid() => return Ok(frame_id),
            Victim::Evict(_) if desc.is_evictable() => {}
            _ => return Err(StorageError::BadBuffer { frame_id }),
        }

        let key = desc.key().ok_or(StorageError::BadBuffer { frame_id })?;
        if desc.is_dirty() {
            self.write_back(desc)?;
            debug!("wrote back {} from frame {}", key, frame_id);
        }
        self.page_table.remove(&key);
        desc.clear();
        trace!("evicted {} from frame {}", key, frame_id);

        Ok(frame_id)
    }

    fn write_back(&self, desc: &FrameDescriptor) -> io::Result<()> {
        match desc.owner() {
            Some(owner) => {
                let data = self.frames[desc.frame_id() as usize].read();
                owner.file.write_page(owner.page_no, &data[..])
            }
            None => Ok(()),
        }
    }

    fn flush_dirty(&self, table: &mut FrameTable) -> Vec<(PageKey, io::Error)> {
        let mut failures = Vec::new();
        for desc in table.descriptors.iter_mut() {
            if !desc.is_valid() || !desc.is_dirty() {
                continue;
            }
            match self.write_back(desc) {
                Ok(()) => desc.mark_clean(),
                Err(err) => {
                    if let Some(key) = desc.key() {
                        failures.push((key, err));
                    }
                }
            }
        }
        failures
    }
}

impl Drop for BufferPoolInner {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        for (key, err) in self.flush_dirty(&mut table) {
            warn!("failed to write back {} on shutdown: {}", key, err);
        }
    }
}
