use anyhow::Result;
use clockpool::storage::{
    BufferPoolConfig, BufferPoolManager, FileRef, MemoryPageFile, PageFile, PageManager, PageNo,
    StorageError, PAGE_SIZE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn pool(num_frames: usize) -> BufferPoolManager {
    BufferPoolManager::new(BufferPoolConfig::new(num_frames)).unwrap()
}

fn memory_file_with_pages(count: u32) -> (Arc<MemoryPageFile>, FileRef, Vec<PageNo>) {
    let mem = Arc::new(MemoryPageFile::new());
    let pages = (0..count)
        .map(|i| {
            let page_no = mem.allocate_page().unwrap();
            mem.write_page(page_no, &[i as u8; PAGE_SIZE]).unwrap();
            page_no
        })
        .collect();
    let file: FileRef = mem.clone();
    (mem, file, pages)
}

#[test]
fn test_unpin_never_drops_below_zero() {
    let pool = pool(3);
    let (_mem, file, pages) = memory_file_with_pages(1);

    pool.fetch_page(&file, pages[0]).unwrap();
    pool.fetch_page(&file, pages[0]).unwrap();
    pool.unpin_page(&file, pages[0], false).unwrap();
    pool.unpin_page(&file, pages[0], false).unwrap();

    for _ in 0..3 {
        let err = pool.unpin_page(&file, pages[0], false).unwrap_err();
        assert!(matches!(err, StorageError::PageNotPinned(_)));
    }
    assert_eq!(pool.pin_count(&file, pages[0]), Some(0));
}

#[test]
fn test_pinned_pages_are_never_evicted() {
    let pool = pool(4);
    let (_mem, file, pages) = memory_file_with_pages(5);

    let handles: Vec<_> = pages[..4]
        .iter()
        .map(|&p| pool.fetch_page(&file, p).unwrap())
        .collect();

    let err = pool.fetch_page(&file, pages[4]).unwrap_err();
    assert!(matches!(err, StorageError::BufferExceeded));

    for (handle, &page_no) in handles.iter().zip(&pages[..4]) {
        assert_eq!(pool.pin_count(&file, page_no), Some(1));
        assert_eq!(pool.read(handle, |d| d[0]).unwrap(), page_no.0 as u8);
    }
}

#[test]
fn test_eviction_removes_index_entry() {
    let pool = pool(2);
    let (_mem, file, pages) = memory_file_with_pages(6);

    for (i, &page_no) in pages.iter().enumerate() {
        pool.fetch_page(&file, page_no).unwrap();
        pool.unpin_page(&file, page_no, false).unwrap();

        // Every fetch is a miss past the first two, and the clock always
        // gives up the older of the two cached pages.
        let resident: Vec<_> = pages
            .iter()
            .copied()
            .filter(|&p| pool.is_resident(&file, p))
            .collect();
        let expected = pages[i.saturating_sub(1)..=i].to_vec();
        assert_eq!(resident, expected);

        for &evicted in &pages[..i.saturating_sub(1)] {
            let err = pool.unpin_page(&file, evicted, false).unwrap_err();
            assert!(matches!(err, StorageError::PageNotResident(k) if k.page_no == evicted));
            assert_eq!(pool.pin_count(&file, evicted), None);
        }
    }
}

#[test]
fn test_dirty_page_reaches_file_before_frame_reuse() {
    let pool = pool(1);
    let (mem, file, pages) = memory_file_with_pages(2);

    let handle = pool.fetch_page(&file, pages[0]).unwrap();
    pool.write(&handle, |d| d.fill(0x5A)).unwrap();
    pool.unpin_page(&file, pages[0], true).unwrap();
    // A second round of changes, so the latest content is what counts.
    let handle = pool.fetch_page(&file, pages[0]).unwrap();
    pool.write(&handle, |d| d[0] = 0xA5).unwrap();
    pool.unpin_page(&file, pages[0], false).unwrap();

    let seeded = mem.writes().len();
    let next = pool.fetch_page(&file, pages[1]).unwrap();

    assert_eq!(next.frame_id(), handle.frame_id());
    assert_eq!(mem.writes()[seeded..].to_vec(), vec![pages[0]]);
    let stored = mem.page(pages[0]).unwrap();
    assert_eq!(stored[0], 0xA5);
    assert!(stored[1..].iter().all(|&b| b == 0x5A));
}

#[test]
fn test_read_after_evict() -> Result<()> {
    let dir = tempdir()?;
    let file: FileRef = Arc::new(PageManager::create(&dir.path().join("evict.db"))?);
    let pool = pool(3);

    let mut pages = Vec::new();
    for i in 0..5u8 {
        let (page_no, handle) = pool.allocate_page(&file)?;
        pool.write(&handle, |d| d[0] = i)?;
        pool.unpin_page(&file, page_no, true)?;
        pages.push(page_no);
    }

    // Page 0 dirty, page 1 left as allocated.
    let h = pool.fetch_page(&file, pages[0])?;
    pool.write(&h, |d| d[1] = 200)?;
    pool.unpin_page(&file, pages[0], true)?;

    for &page_no in &pages[2..] {
        pool.fetch_page(&file, page_no)?;
        pool.unpin_page(&file, page_no, false)?;
    }
    for &page_no in &pages[2..] {
        pool.fetch_page(&file, page_no)?;
        pool.unpin_page(&file, page_no, false)?;
    }
    assert!(!pool.is_resident(&file, pages[0]));

    let h = pool.fetch_page(&file, pages[0])?;
    assert_eq!(pool.read(&h, |d| (d[0], d[1]))?, (0, 200));
    let h = pool.fetch_page(&file, pages[1])?;
    assert_eq!(pool.read(&h, |d| (d[0], d[1]))?, (1, 0));

    Ok(())
}

#[test]
fn test_flush_file_with_pinned_page() {
    let pool = pool(6);
    let (mem, file, pages) = memory_file_with_pages(5);

    for &page_no in &pages {
        let handle = pool.fetch_page(&file, page_no).unwrap();
        pool.write(&handle, |d| d[0] = 100 + page_no.0 as u8).unwrap();
    }
    for &page_no in &pages {
        if page_no != pages[2] {
            pool.unpin_page(&file, page_no, true).unwrap();
        }
    }

    let seeded = mem.writes().len();
    let err = pool.flush_file(&file).unwrap_err();
    assert!(matches!(err, StorageError::PagePinned(k) if k.page_no == pages[2]));

    // Pages ahead of the pinned one were written and evicted; nothing after it.
    assert_eq!(mem.writes()[seeded..].to_vec(), vec![pages[0], pages[1]]);
    assert!(!pool.is_resident(&file, pages[0]));
    assert!(!pool.is_resident(&file, pages[1]));
    for &page_no in &pages[2..] {
        assert!(pool.is_resident(&file, page_no));
    }
    assert_eq!(mem.page(pages[3]).unwrap()[0], 3);

    // Once unpinned the rest of the file flushes cleanly.
    pool.unpin_page(&file, pages[2], true).unwrap();
    pool.flush_file(&file).unwrap();
    for &page_no in &pages {
        assert!(!pool.is_resident(&file, page_no));
        assert_eq!(mem.page(page_no).unwrap()[0], 100 + page_no.0 as u8);
    }
}

#[test]
fn test_clock_uses_every_frame_before_reuse() {
    let num_frames = 5;
    let pool = pool(num_frames);
    let (_mem, file, pages) = memory_file_with_pages(num_frames as u32 + 1);

    let mut seen = HashSet::new();
    for &page_no in &pages[..num_frames] {
        let handle = pool.fetch_page(&file, page_no).unwrap();
        assert!(seen.insert(handle.frame_id()), "frame reused too early");
        pool.unpin_page(&file, page_no, false).unwrap();
    }
    assert_eq!(seen.len(), num_frames);

    let handle = pool.fetch_page(&file, pages[num_frames]).unwrap();
    assert_eq!(handle.frame_id(), 0);
    assert!(!pool.is_resident(&file, pages[0]));
}

#[test]
fn test_dispose_then_reallocate() {
    let pool = pool(2);
    let (mem, file, _) = memory_file_with_pages(0);

    let (page_no, handle) = pool.allocate_page(&file).unwrap();
    pool.write(&handle, |d| d[0] = 9).unwrap();
    pool.unpin_page(&file, page_no, true).unwrap();
    pool.dispose_page(&file, page_no).unwrap();

    let (again, handle) = pool.allocate_page(&file).unwrap();
    assert_eq!(again, page_no);
    assert_eq!(pool.read(&handle, |d| d[0]).unwrap(), 0);
    assert!(mem.writes().is_empty());
}

#[test]
fn test_teardown_writes_back_to_disk() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("teardown.db");

    let page_no = {
        let file: FileRef = Arc::new(PageManager::create(&path)?);
        let pool = pool(4);
        let (page_no, handle) = pool.allocate_page(&file)?;
        pool.write(&handle, |d| d[..5].copy_from_slice(b"hello"))?;
        pool.unpin_page(&file, page_no, true)?;
        page_no
    };

    let file = PageManager::open(&path)?;
    let mut buf = vec![0u8; PAGE_SIZE];
    file.read_page(page_no, &mut buf)?;
    assert_eq!(&buf[..5], b"hello");

    Ok(())
}

#[test]
fn test_random_workload_matches_shadow_copy() -> Result<()> {
    let dir = tempdir()?;
    let file: FileRef = Arc::new(PageManager::create(&dir.path().join("random.db"))?);
    let pool = pool(8);
    let mut rng = StdRng::seed_from_u64(7);

    let mut shadow = Vec::new();
    for _ in 0..32 {
        let (page_no, _) = pool.allocate_page(&file)?;
        pool.unpin_page(&file, page_no, true)?;
        shadow.push((page_no, 0u8));
    }

    for _ in 0..2000 {
        let idx = rng.gen_range(0..shadow.len());
        let (page_no, expected) = shadow[idx];
        let handle = pool.fetch_page(&file, page_no)?;
        assert_eq!(pool.read(&handle, |d| d[0])?, expected);

        let dirty = rng.gen_bool(0.5);
        if dirty {
            let value = expected.wrapping_add(1);
            pool.write(&handle, |d| d[0] = value)?;
            shadow[idx].1 = value;
        }
        pool.unpin_page(&file, page_no, dirty)?;
    }

    pool.flush_file(&file)?;
    for &(page_no, expected) in &shadow {
        assert!(!pool.is_resident(&file, page_no));
        let handle = pool.fetch_page(&file, page_no)?;
        assert_eq!(pool.read(&handle, |d| d[0])?, expected);
        pool.unpin_page(&file, page_no, false)?;
    }

    Ok(())
}

#[test]
fn test_concurrent_fetch_and_unpin() {
    let pool = pool(8);
    let (mem, file, _) = memory_file_with_pages(0);
    let pages: Vec<PageNo> = (0..32).map(|_| mem.allocate_page().unwrap()).collect();

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let pool = pool.clone();
            let file = file.clone();
            let pages = pages.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..500 {
                    let page_no = pages[rng.gen_range(0..pages.len())];
                    // At most four pins at a time, so eight frames never run out.
                    let handle = pool.fetch_page(&file, page_no).unwrap();
                    pool.write(&handle, |d| {
                        let count = u32::from_le_bytes(d[..4].try_into().unwrap());
                        d[..4].copy_from_slice(&(count + 1).to_le_bytes());
                    })
                    .unwrap();
                    pool.unpin_page(&file, page_no, true).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    pool.flush_file(&file).unwrap();
    let total: u32 = pages
        .iter()
        .map(|&p| u32::from_le_bytes(mem.page(p).unwrap()[..4].try_into().unwrap()))
        .sum();
    assert_eq!(total, 4 * 500);
}
