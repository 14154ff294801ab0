//! clockpool - drives a random page workload through the buffer pool and checks
//! that every page reads back the last version written to it.

use anyhow::{bail, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use clap::Parser as ClapParser;
use clockpool::storage::{
    BufferPoolConfig, BufferPoolManager, FileRef, PageHandle, PageManager, PageNo, StorageError,
    PAGE_SIZE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;

/// clockpool - buffer pool workload driver
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory for the data file
    #[arg(short = 'D', long, default_value = "./clockpool_data")]
    data_dir: PathBuf,

    /// Number of buffer pool frames
    #[arg(short, long, default_value = "16")]
    frames: usize,

    /// Number of pages in the data file
    #[arg(short, long, default_value = "64")]
    pages: u32,

    /// Number of random fetch/unpin operations
    #[arg(short, long, default_value = "10000")]
    ops: usize,

    /// Seed for the workload
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

const PAGE_NO_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;

fn stamp(data: &mut [u8; PAGE_SIZE], page_no: PageNo, version: u64) {
    LittleEndian::write_u32(&mut data[PAGE_NO_OFFSET..VERSION_OFFSET], page_no.0);
    LittleEndian::write_u64(&mut data[VERSION_OFFSET..VERSION_OFFSET + 8], version);
    data[PAGE_SIZE - 1] = version as u8;
}

fn read_stamp(data: &[u8; PAGE_SIZE]) -> (u32, u64, u8) {
    (
        LittleEndian::read_u32(&data[PAGE_NO_OFFSET..VERSION_OFFSET]),
        LittleEndian::read_u64(&data[VERSION_OFFSET..VERSION_OFFSET + 8]),
        data[PAGE_SIZE - 1],
    )
}

fn verify(
    pool: &BufferPoolManager,
    handle: &PageHandle,
    page_no: PageNo,
    version: u64,
) -> Result<()> {
    let (stored_page, stored_version, tail) = pool.read(handle, read_stamp)?;
    if stored_page != page_no.0 || stored_version != version || tail != version as u8 {
        bail!(
            "page {} holds (page {}, version {}), expected version {}",
            page_no,
            stored_page,
            stored_version,
            version
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if args.pages == 0 {
        bail!("--pages must be at least 1");
    }

    std::fs::create_dir_all(&args.data_dir).context("Failed to create data directory")?;
    let path = args.data_dir.join("clockpool.db");
    println!(
        "Frames: {}, pages: {}, operations: {}, seed: {}",
        args.frames, args.pages, args.ops, args.seed
    );

    let manager = PageManager::create(&path)?;
    println!("Data file: {}", manager.path().display());
    let file: FileRef = Arc::new(manager);
    let pool = BufferPoolManager::new(BufferPoolConfig::new(args.frames))?;

    let mut pages = Vec::with_capacity(args.pages as usize);
    for _ in 0..args.pages {
        let (page_no, handle) = pool.allocate_page(&file)?;
        pool.write(&handle, |data| stamp(data, page_no, 0))?;
        pool.unpin_page(&file, page_no, true)?;
        pages.push(page_no);
    }
    let mut versions = vec![0u64; pages.len()];

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut updates = 0usize;
    for _ in 0..args.ops {
        let idx = rng.gen_range(0..pages.len());
        let page_no = pages[idx];
        let handle = pool.fetch_page(&file, page_no)?;
        verify(&pool, &handle, page_no, versions[idx])?;

        let dirty = rng.gen_bool(0.3);
        if dirty {
            versions[idx] += 1;
            let version = versions[idx];
            pool.write(&handle, |data| stamp(data, page_no, version))?;
            updates += 1;
        }
        pool.unpin_page(&file, page_no, dirty)?;
    }
    println!("Workload done: {} reads verified, {} updates", args.ops, updates);

    if pages.len() > pool.num_frames() {
        let pinned = &pages[..pool.num_frames()];
        for &page_no in pinned {
            pool.fetch_page(&file, page_no)?;
        }
        match pool.fetch_page(&file, pages[pool.num_frames()]) {
            Err(StorageError::BufferExceeded) => println!("Fully pinned pool refused a fetch"),
            Ok(_) => bail!("fetch succeeded with every frame pinned"),
            Err(e) => return Err(e.into()),
        }
        for &page_no in pinned {
            pool.unpin_page(&file, page_no, false)?;
        }
    }

    pool.flush_file(&file)?;
    drop(pool);
    drop(file);

    let file: FileRef = Arc::new(PageManager::open(&path)?);
    let pool = BufferPoolManager::new(BufferPoolConfig::new(args.frames))?;
    for (idx, &page_no) in pages.iter().enumerate() {
        let handle = pool.fetch_page(&file, page_no)?;
        verify(&pool, &handle, page_no, versions[idx])?;
        pool.unpin_page(&file, page_no, false)?;
    }
    println!("Reopened file: all {} pages verified", pages.len());

    Ok(())
}
