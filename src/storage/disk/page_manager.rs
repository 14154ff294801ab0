use crate::storage::disk::{check_buffer_len, PageFile};
use crate::storage::page::{FileId, PageNo};
use crate::storage::PAGE_SIZE;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A `PageFile` stored in a regular file; page `n` lives at `n * PAGE_SIZE`.
///
/// Disposed page numbers are remembered for the lifetime of the handle and
/// handed out again by `allocate_page` before the file is extended.
pub struct PageManager {
    id: FileId,
    path: PathBuf,
    inner: Mutex<PageManagerInner>,
}

struct PageManagerInner {
    file: File,
    free_pages: BTreeSet<PageNo>,
}

impl PageManager {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;

        Ok(Self::with_file(path, file))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;

        Ok(Self::with_file(path, file))
    }

    fn with_file(path: &Path, file: File) -> Self {
        Self {
            id: FileId::next(),
            path: path.to_path_buf(),
            inner: Mutex::new(PageManagerInner {
                file,
                free_pages: BTreeSet::new(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of page slots in the file, disposed ones included.
    pub fn num_pages(&self) -> io::Result<u32> {
        self.inner.lock().num_pages()
    }

    fn page_offset(page_no: PageNo) -> u64 {
        page_no.0 as u64 * PAGE_SIZE as u64
    }
}

impl PageManagerInner {
    fn num_pages(&self) -> io::Result<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn check_allocated(&self, page_no: PageNo) -> io::Result<()> {
        if page_no.0 >= self.num_pages()? || self.free_pages.contains(&page_no) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Page {} does not exist", page_no),
            ));
        }
        Ok(())
    }

    fn write_at(&mut self, page_no: PageNo, data: &[u8]) -> io::Result<()> {
        self.file
            .seek(SeekFrom::Start(PageManager::page_offset(page_no)))?;
        self.file.write_all(data)?;
        self.file.sync_data()
    }
}

impl PageFile for PageManager {
    fn id(&self) -> FileId {
        self.id
    }

    fn allocate_page(&self) -> io::Result<PageNo> {
        let mut inner = self.inner.lock();

        if let Some(page_no) = inner.free_pages.pop_first() {
            inner.write_at(page_no, &[0u8; PAGE_SIZE])?;
            return Ok(page_no);
        }

        let current_pages = inner.num_pages()?;
        let new_size = (current_pages as u64 + 1) * PAGE_SIZE as u64;
        inner.file.set_len(new_size)?;

        Ok(PageNo(current_pages))
    }

    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> io::Result<()> {
        check_buffer_len(buf.len())?;

        let mut inner = self.inner.lock();
        inner.check_allocated(page_no)?;

        inner
            .file
            .seek(SeekFrom::Start(Self::page_offset(page_no)))?;
        inner.file.read_exact(buf)
    }

    fn write_page(&self, page_no: PageNo, data: &[u8]) -> io::Result<()> {
        check_buffer_len(data.len())?;

        let mut inner = self.inner.lock();
        inner.check_allocated(page_no)?;
        inner.write_at(page_no, data)
    }

    fn dispose_page(&self, page_no: PageNo) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.check_allocated(page_no)?;
        inner.free_pages.insert(page_no);
        Ok(())
    }
}

impl fmt::Debug for PageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageManager")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
