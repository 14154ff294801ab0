use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub const PAGE_SIZE: usize = 8192;

static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of a backing file. Every `PageFile` gets a fresh one when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    /// Hands out a process-unique file id.
    pub fn next() -> Self {
        FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNo(pub u32);

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page named by its file and its number within that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub file: FileId,
    pub page_no: PageNo,
}

impl PageKey {
    pub fn new(file: FileId, page_no: PageNo) -> Self {
        Self { file, page_no }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/page:{}", self.file, self.page_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ids_are_unique() {
        let a = FileId::next();
        let b = FileId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_key_equality() {
        let file = FileId(7);
        let other = FileId(8);

        assert_eq!(PageKey::new(file, PageNo(1)), PageKey::new(file, PageNo(1)));
        assert_ne!(PageKey::new(file, PageNo(1)), PageKey::new(file, PageNo(2)));
        assert_ne!(PageKey::new(file, PageNo(1)), PageKey::new(other, PageNo(1)));
    }

    #[test]
    fn test_page_key_display() {
        let key = PageKey::new(FileId(3), PageNo(42));
        assert_eq!(key.to_string(), "file:3/page:42");
    }
}
