//! In-memory page file for tests and tooling.

use crate::storage::disk::{check_buffer_len, PageFile};
use crate::storage::page::{FileId, PageNo};
use crate::storage::PAGE_SIZE;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// A `PageFile` kept entirely in memory.
///
/// Besides the plain page store it records every write it receives and can be
/// told to fail reads or writes, which lets callers exercise I/O error paths.
#[derive(Debug)]
pub struct MemoryPageFile {
    id: FileId,
    state: Mutex<MemoryState>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryState {
    pages: HashMap<PageNo, Box<[u8; PAGE_SIZE]>>,
    free_pages: BTreeSet<PageNo>,
    next_page_no: u32,
    write_log: Vec<PageNo>,
}

impl MemoryPageFile {
    pub fn new() -> Self {
        Self {
            id: FileId::next(),
            state: Mutex::new(MemoryState::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent read fail until switched off again.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Page numbers of all successful writes, oldest first.
    pub fn writes(&self) -> Vec<PageNo> {
        self.state.lock().write_log.clone()
    }

    /// Stored content of a page, bypassing any cache in front of this file.
    pub fn page(&self, page_no: PageNo) -> Option<Vec<u8>> {
        self.state.lock().pages.get(&page_no).map(|p| p.to_vec())
    }

    pub fn num_pages(&self) -> usize {
        self.state.lock().pages.len()
    }
}

impl Default for MemoryPageFile {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(page_no: PageNo) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("Page {} does not exist", page_no),
    )
}

fn injected(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", op))
}

impl PageFile for MemoryPageFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn allocate_page(&self) -> io::Result<PageNo> {
        let mut state = self.state.lock();
        let page_no = match state.free_pages.pop_first() {
            Some(page_no) => page_no,
            None => {
                let page_no = PageNo(state.next_page_no);
                state.next_page_no += 1;
                page_no
            }
        };
        state.pages.insert(page_no, Box::new([0u8; PAGE_SIZE]));
        Ok(page_no)
    }

    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> io::Result<()> {
        check_buffer_len(buf.len())?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }

        let state = self.state.lock();
        let page = state.pages.get(&page_no).ok_or_else(|| not_found(page_no))?;
        buf.copy_from_slice(&page[..]);
        Ok(())
    }

    fn write_page(&self, page_no: PageNo, data: &[u8]) -> io::Result<()> {
        check_buffer_len(data.len())?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }

        let mut state = self.state.lock();
        let page = state
            .pages
            .get_mut(&page_no)
            .ok_or_else(|| not_found(page_no))?;
        page.copy_from_slice(data);
        state.write_log.push(page_no);
        Ok(())
    }

    fn dispose_page(&self, page_no: PageNo) -> io::Result<()> {
        let mut state = self.state.lock();
        state
            .pages
            .remove(&page_no)
            .ok_or_else(|| not_found(page_no))?;
        state.free_pages.insert(page_no);
        Ok(())
    }
}
