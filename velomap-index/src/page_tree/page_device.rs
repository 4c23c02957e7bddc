//! Block devices holding 512-byte pages.
//!
//! A device only moves whole pages. It knows nothing about the layouts on
//! them; decoding is left to the page store. Each read is one positioned
//! read of exactly one page, with no read-ahead.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::RwLock;

use super::tree_constants::PAGE_SIZE;
use super::tree_types::{PageId, PageTreeError, PageTreeResult};

/// Whole-page storage addressed by [`PageId`].
///
/// Methods take `&self` so a read-only store can be shared by concurrent
/// readers; implementations synchronize internally.
pub trait PageDevice {
    /// Fills `buf` with the contents of `page`.
    fn read_block(&self, page: PageId, buf: &mut [u8; PAGE_SIZE]) -> PageTreeResult<()>;

    /// Overwrites `page` with `buf`, growing the device if needed.
    fn write_block(&self, page: PageId, buf: &[u8; PAGE_SIZE]) -> PageTreeResult<()>;

    /// Number of whole pages the device holds.
    fn block_count(&self) -> PageTreeResult<u64>;

    /// Makes completed writes durable.
    fn sync(&self) -> PageTreeResult<()>;
}

fn past_end(page: PageId, blocks: u64) -> PageTreeError {
    PageTreeError::InvalidReference(format!("{} past end of device ({} pages)", page, blocks))
}

// ============================================================================
// File
// ============================================================================

/// Page file on disk, one seek and one read per page.
pub struct FileDevice {
    file: RwLock<File>,
    path: PathBuf,
}

impl FileDevice {
    /// Creates (or truncates) a page file.
    pub fn create(path: &Path) -> PageTreeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing page file for reading and writing.
    pub fn open(path: &Path) -> PageTreeResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing page file without write access; writes fail with an I/O error.
    pub fn open_read_only(path: &Path) -> PageTreeResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageDevice for FileDevice {
    fn read_block(&self, page: PageId, buf: &mut [u8; PAGE_SIZE]) -> PageTreeResult<()> {
        let mut file = self.file.write();
        let len = file.metadata()?.len();
        if page.offset() + PAGE_SIZE as u64 > len {
            return Err(past_end(page, len / PAGE_SIZE as u64));
        }
        file.seek(SeekFrom::Start(page.offset()))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, page: PageId, buf: &[u8; PAGE_SIZE]) -> PageTreeResult<()> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(page.offset()))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn block_count(&self) -> PageTreeResult<u64> {
        Ok(self.file.read().metadata()?.len() / PAGE_SIZE as u64)
    }

    fn sync(&self) -> PageTreeResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Pages held in a byte vector. Used for tests and for building an index
/// that is shipped elsewhere as raw bytes.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing page image. A trailing partial page is ignored.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.into_inner()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl PageDevice for MemoryDevice {
    fn read_block(&self, page: PageId, buf: &mut [u8; PAGE_SIZE]) -> PageTreeResult<()> {
        let bytes = self.bytes.read();
        let start = page.offset() as usize;
        let block = bytes
            .get(start..start + PAGE_SIZE)
            .ok_or_else(|| past_end(page, (bytes.len() / PAGE_SIZE) as u64))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, page: PageId, buf: &[u8; PAGE_SIZE]) -> PageTreeResult<()> {
        let mut bytes = self.bytes.write();
        let start = page.offset() as usize;
        if bytes.len() < start + PAGE_SIZE {
            bytes.resize(start + PAGE_SIZE, 0);
        }
        bytes[start..start + PAGE_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn block_count(&self) -> PageTreeResult<u64> {
        Ok((self.bytes.read().len() / PAGE_SIZE) as u64)
    }

    fn sync(&self) -> PageTreeResult<()> {
        Ok(())
    }
}

// ============================================================================
// Memory map
// ============================================================================

/// Read-only memory-mapped page file.
pub struct MmapDevice {
    mmap: Mmap,
    path: PathBuf,
}

impl MmapDevice {
    pub fn open(path: &Path) -> PageTreeResult<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and page files are never modified
        // after they are written; a rebuild produces a new file.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageDevice for MmapDevice {
    fn read_block(&self, page: PageId, buf: &mut [u8; PAGE_SIZE]) -> PageTreeResult<()> {
        let start = page.offset() as usize;
        let block = self
            .mmap
            .get(start..start + PAGE_SIZE)
            .ok_or_else(|| past_end(page, (self.mmap.len() / PAGE_SIZE) as u64))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, _page: PageId, _buf: &[u8; PAGE_SIZE]) -> PageTreeResult<()> {
        Err(PageTreeError::ReadOnly)
    }

    fn block_count(&self) -> PageTreeResult<u64> {
        Ok((self.mmap.len() / PAGE_SIZE) as u64)
    }

    fn sync(&self) -> PageTreeResult<()> {
        Ok(())
    }
}
