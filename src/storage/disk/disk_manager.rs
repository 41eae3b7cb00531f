use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::error;
use parking_lot::Mutex;

use crate::common::{
    PageId, Result, SiltError, EXTENT_SIZE, INVALID_PAGE_ID, MAX_EXTENT_COUNT, PAGE_SIZE,
};

use super::bitmap_page::BitmapPage;
use super::meta_page::FileMetaPage;

/// Physical page reserved for the file metadata
const META_PHYSICAL_PAGE: u64 = 0;

/// DiskManager owns the backing file and the mapping from logical page ids
/// to physical byte offsets. Each extent of `EXTENT_SIZE` data pages is
/// preceded by one bitmap page, so the file reads
///
/// ```text
/// [meta][bitmap 0][data pages of extent 0][bitmap 1][data pages of extent 1]...
/// ```
///
/// and logical page `p` lives at physical page `p + 2 + p / EXTENT_SIZE`.
/// Allocation state (the bitmaps plus per-extent counters in the metadata
/// page) is owned here as well; all file and metadata access serializes
/// behind one lock.
pub struct DiskManager {
    inner: Mutex<DiskInner>,
    db_path: PathBuf,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

struct DiskInner {
    file: File,
    meta: FileMetaPage,
    closed: bool,
}

fn physical_page_of(page_id: PageId) -> u64 {
    let id = page_id.as_u32() as u64;
    id + 2 + id / EXTENT_SIZE as u64
}

fn bitmap_physical_page(extent: u32) -> u64 {
    extent as u64 * (EXTENT_SIZE as u64 + 1) + 1
}

impl DiskManager {
    /// Opens the backing file at `db_path`, creating it (and any missing
    /// parent directories) when it does not exist, then loads the metadata
    /// page.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut file, META_PHYSICAL_PAGE, &mut buf)?;
        let meta = FileMetaPage::from_bytes(&buf);

        Ok(Self {
            inner: Mutex::new(DiskInner {
                file,
                meta,
                closed: false,
            }),
            db_path: path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads the logical page into the provided buffer. Reading a page that
    /// was never written zero-fills the buffer instead of failing.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        assert_ne!(page_id, INVALID_PAGE_ID, "invalid page id");

        let mut guard = self.inner.lock();
        Self::read_physical(&mut guard.file, physical_page_of(page_id), data)?;
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the provided buffer to the logical page.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        assert_ne!(page_id, INVALID_PAGE_ID, "invalid page id");

        let mut guard = self.inner.lock();
        Self::write_physical(&mut guard.file, physical_page_of(page_id), data)?;
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Claims the lowest free logical page id. Extents are scanned in
    /// ascending order; a fresh extent is appended once every existing one
    /// is full. Fails with `OutOfSpace` when the metadata page cannot track
    /// another extent.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut buf = [0u8; PAGE_SIZE];

        let num_extents = inner.meta.num_extents();
        for extent in 0..num_extents {
            if inner.meta.extent_used_pages(extent) >= EXTENT_SIZE {
                continue;
            }
            let phys = bitmap_physical_page(extent);
            Self::read_physical(&mut inner.file, phys, &mut buf)?;
            let mut bitmap = BitmapPage::from_bytes(&buf);
            if let Some(offset) = bitmap.allocate() {
                bitmap.to_bytes(&mut buf);
                Self::write_physical(&mut inner.file, phys, &buf)?;
                inner.meta.record_allocated(extent);
                return Ok(PageId::new(extent * EXTENT_SIZE + offset));
            }
        }

        if num_extents >= MAX_EXTENT_COUNT {
            return Err(SiltError::OutOfSpace);
        }

        // Every existing extent is full: start a new one.
        let mut bitmap = BitmapPage::new();
        let offset = bitmap.allocate().unwrap();
        bitmap.to_bytes(&mut buf);
        Self::write_physical(&mut inner.file, bitmap_physical_page(num_extents), &buf)?;
        inner.meta.push_extent();
        inner.meta.record_allocated(num_extents);

        Ok(PageId::new(num_extents * EXTENT_SIZE + offset))
    }

    /// Returns the logical page to the free pool. Deallocating a page that
    /// is already free (or was never allocated) is a no-op.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let extent = page_id.as_u32() / EXTENT_SIZE;
        let offset = page_id.as_u32() % EXTENT_SIZE;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if extent >= inner.meta.num_extents() {
            return Ok(());
        }

        let mut buf = [0u8; PAGE_SIZE];
        let phys = bitmap_physical_page(extent);
        Self::read_physical(&mut inner.file, phys, &mut buf)?;
        let mut bitmap = BitmapPage::from_bytes(&buf);
        if bitmap.deallocate(offset) {
            bitmap.to_bytes(&mut buf);
            Self::write_physical(&mut inner.file, phys, &buf)?;
            inner.meta.record_deallocated(extent);
        }
        Ok(())
    }

    /// Reads the allocation bit for the logical page without mutating
    /// anything. Pages beyond every existing extent report free.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let extent = page_id.as_u32() / EXTENT_SIZE;
        let offset = page_id.as_u32() % EXTENT_SIZE;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if extent >= inner.meta.num_extents() {
            return Ok(true);
        }

        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner.file, bitmap_physical_page(extent), &mut buf)?;
        Ok(BitmapPage::from_bytes(&buf).is_free(offset))
    }

    /// Flushes the metadata page and syncs the file. Safe to call more than
    /// once; construction after a `close` requires a new DiskManager.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.closed {
            return Ok(());
        }

        let mut buf = [0u8; PAGE_SIZE];
        inner.meta.to_bytes(&mut buf);
        Self::write_physical(&mut inner.file, META_PHYSICAL_PAGE, &buf)?;
        inner.file.sync_all()?;
        inner.closed = true;
        Ok(())
    }

    /// Total number of allocated logical pages.
    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages()
    }

    /// Number of extents the file currently holds.
    pub fn num_extents(&self) -> u32 {
        self.inner.lock().meta.num_extents()
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_physical(file: &mut File, physical_page: u64, data: &mut [u8]) -> Result<()> {
        let offset = physical_page * PAGE_SIZE as u64;
        if offset >= file.metadata()?.len() {
            data.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }
        Ok(())
    }

    fn write_physical(file: &mut File, physical_page: u64, data: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(physical_page * PAGE_SIZE as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to flush file metadata on close: {}", e);
        }
    }
}
