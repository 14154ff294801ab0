//! Backing files that the buffer pool reads pages from and writes pages to.

pub mod memory;
pub mod page_manager;

use crate::storage::page::{FileId, PageNo};
use std::fmt::Debug;
use std::io;
use std::sync::Arc;

pub use memory::MemoryPageFile;
pub use page_manager::PageManager;

/// A file of fixed-size pages.
///
/// Methods take `&self` so a single file can be shared between the buffer pool
/// and its callers; implementations synchronize internally. Buffers passed to
/// `read_page` and `write_page` must be exactly `PAGE_SIZE` bytes long.
pub trait PageFile: Send + Sync + Debug {
    /// Identity used to scope pages to this file.
    fn id(&self) -> FileId;

    /// Reserve a page number. The page reads back as zeroes until written.
    fn allocate_page(&self) -> io::Result<PageNo>;

    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> io::Result<()>;

    fn write_page(&self, page_no: PageNo, data: &[u8]) -> io::Result<()>;

    /// Release a page number so a later allocation may reuse it.
    fn dispose_page(&self, page_no: PageNo) -> io::Result<()>;
}

/// Shared handle to a backing file, as held by the buffer pool.
pub type FileRef = Arc<dyn PageFile>;

pub(crate) fn check_buffer_len(len: usize) -> io::Result<()> {
    if len != crate::storage::PAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Buffer size must be PAGE_SIZE ({}), got {}",
                crate::storage::PAGE_SIZE,
                len
            ),
        ));
    }
    Ok(())
}
