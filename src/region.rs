//! Memory-mapped file region management.
//!
//! Owns the single file backing a table: header, index array, and payload
//! arena all live in one `mmap`. The file's own advisory exclusive lock
//! (`flock`) is the cross-process concurrency contract described in the
//! design — held for as long as the file descriptor stays open, released
//! automatically when the `Region` (and therefore the `File`) is dropped.
use std::fs::{self, File, OpenOptions};
use std::io;
use std::mem::ManuallyDrop;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{PhmError, Result};
use crate::layout::{self, Header, IndexSlot, FORMAT_VERSION, MAGIC};

/// The mapped region backing a table, plus the file handle that owns the
/// advisory lock.
///
/// `mmap` and `file` are wrapped in `ManuallyDrop` so `Region`'s own `Drop`
/// impl can unmap and close by hand and report failures, instead of
/// letting `MmapMut`'s and `File`'s ordinary drops do it silently.
pub struct Region {
    mmap: ManuallyDrop<MmapMut>,
    file: ManuallyDrop<File>,
    path: PathBuf,
}

impl Region {
    /// Create a new region, initializing the header. Fails if `path`
    /// already exists.
    pub fn create(path: &Path, table_size: u32, max_assoc_bytes: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| io_err("create", path, e))?;

        match Self::init_created(path, &file, table_size, max_assoc_bytes) {
            Ok(mmap) => Ok(Region {
                mmap: ManuallyDrop::new(mmap),
                file: ManuallyDrop::new(file),
                path: path.to_path_buf(),
            }),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(path);
                Err(e)
            }
        }
    }

    fn init_created(
        path: &Path,
        file: &File,
        table_size: u32,
        max_assoc_bytes: u32,
    ) -> Result<MmapMut> {
        lock_exclusive(path, file)?;

        let len = layout::region_size(table_size, max_assoc_bytes) as u64;
        file.set_len(len).map_err(|e| io_err("truncate", path, e))?;

        // Safety: we just created this file and exclusively hold its lock.
        let mut mmap = unsafe { MmapMut::map_mut(file) }.map_err(|e| io_err("mmap", path, e))?;

        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut Header) };
        header.magic = MAGIC;
        header.version = FORMAT_VERSION;
        header._reserved = 0;
        header.table_size = table_size;
        header.max_assoc_bytes = max_assoc_bytes;
        header.next_free_assoc = 0;

        mmap.flush().map_err(|e| io_err("mmap", path, e))?;
        Ok(mmap)
    }

    /// Open an existing region read-write, validating the header magic and
    /// that the file is at least as long as the header claims.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| io_err("open", path, e))?;

        lock_exclusive(path, &file)?;

        let found_len = file
            .metadata()
            .map_err(|e| io_err("open", path, e))?
            .len();
        if (found_len as usize) < layout::HEADER_SIZE {
            return Err(PhmError::TooShort {
                path: path.to_path_buf(),
                expected: layout::HEADER_SIZE as u64,
                found: found_len,
            });
        }

        // Safety: the file is at least HEADER_SIZE bytes and we hold the lock.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| io_err("mmap", path, e))?;

        let header = unsafe { &*(mmap.as_ptr() as *const Header) };
        if header.magic != MAGIC {
            return Err(PhmError::BadMagic {
                path: path.to_path_buf(),
            });
        }

        let expected = layout::region_size(header.table_size, header.max_assoc_bytes) as u64;
        if found_len < expected {
            return Err(PhmError::TooShort {
                path: path.to_path_buf(),
                expected,
                found: found_len,
            });
        }

        Ok(Region {
            mmap: ManuallyDrop::new(mmap),
            file: ManuallyDrop::new(file),
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn header(&self) -> &Header {
        unsafe { &*(self.mmap.as_ptr() as *const Header) }
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut Header) }
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn base_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// Pointer to the i-th index slot.
    ///
    /// # Safety
    /// `i` must be `< header().table_size`.
    #[inline]
    pub unsafe fn index_slot_ptr(&self, i: u32) -> *const IndexSlot {
        self.base_ptr()
            .add(layout::index_offset() + i as usize * layout::INDEX_SLOT_SIZE) as *const IndexSlot
    }

    /// Mutable pointer to the i-th index slot.
    ///
    /// # Safety
    /// `i` must be `< header().table_size`.
    #[inline]
    pub unsafe fn index_slot_mut_ptr(&mut self, i: u32) -> *mut IndexSlot {
        self.base_mut_ptr()
            .add(layout::index_offset() + i as usize * layout::INDEX_SLOT_SIZE) as *mut IndexSlot
    }

    /// Pointer to the payload cell at the given arena-relative byte offset.
    ///
    /// # Safety
    /// `offset` must be `< max_assoc_bytes * table_size` and a multiple of
    /// `max_assoc_bytes`.
    #[inline]
    pub unsafe fn payload_cell_ptr(&self, offset: u64) -> *const u8 {
        let table_size = self.header().table_size;
        self.base_ptr()
            .add(layout::payload_offset(table_size) + offset as usize)
    }

    /// Mutable pointer to the payload cell at the given arena-relative byte
    /// offset.
    ///
    /// # Safety
    /// Same requirements as [`Region::payload_cell_ptr`].
    #[inline]
    pub unsafe fn payload_cell_mut_ptr(&mut self, offset: u64) -> *mut u8 {
        let table_size = self.header().table_size;
        self.base_mut_ptr()
            .add(layout::payload_offset(table_size) + offset as usize)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Unmaps and closes by hand, reporting either failure to `stderr` — `Drop`
/// can't return a `Result`, and the reference `phm_close_table` reports
/// both independently the same way rather than stopping at the first.
impl Drop for Region {
    fn drop(&mut self) {
        let len = self.mmap.len();
        let ptr = self.mmap.as_mut_ptr() as *mut libc::c_void;
        // Safety: `ptr`/`len` describe exactly the mapping `MmapMut::map_mut`
        // created; `mmap`'s own `Drop` never runs (it's `ManuallyDrop`), so
        // this is the mapping's one and only unmap.
        if unsafe { libc::munmap(ptr, len) } != 0 {
            eprintln!(
                "could not close table {:?}: {}",
                self.path,
                io::Error::last_os_error()
            );
        }

        // Safety: `file`'s own `Drop` never runs (it's `ManuallyDrop`), so
        // this is the descriptor's one and only close.
        if unsafe { libc::close(self.file.as_raw_fd()) } != 0 {
            eprintln!(
                "could not close table {:?}: {}",
                self.path,
                io::Error::last_os_error()
            );
        }
    }
}

fn lock_exclusive(path: &Path, file: &File) -> Result<()> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 {
        return Err(io_err("lock", path, io::Error::last_os_error()));
    }
    Ok(())
}

fn io_err(op: &'static str, path: &Path, source: io::Error) -> PhmError {
    PhmError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}
