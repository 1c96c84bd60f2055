//! `Table`: the public handle wrapping a mapped region, and the `put`/`get`
//! decision layers built on top of the probe engine.
use std::path::Path;

use crate::error::{PhmError, Result};
use crate::layout::{self, CellHeader, RESERVED_HASH};
use crate::probe::{self, ProbeResult};
use crate::region::Region;

/// Result of a successful `put`: whether the key was newly inserted or an
/// existing entry was updated (by value rewrite or by compaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Updated,
}

/// A persistent, memory-mapped, fixed-capacity hash-map cache.
///
/// One `Table` owns one mapped file and its advisory exclusive lock for as
/// long as it's alive; dropping it unmaps and releases the lock (see
/// `Region`'s `Drop` via its inner `File`).
pub struct Table {
    region: Region,
}

impl Table {
    /// Create a new table file. `table_size` and `max_assoc_bytes` must
    /// both be strictly positive; `max_assoc_bytes` is rounded up to the
    /// next multiple of 8 (a diagnostic is printed to stderr when rounding
    /// actually changes the value). Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, table_size: i64, max_assoc_bytes: i64) -> Result<Self> {
        if table_size <= 0 || max_assoc_bytes <= 0 {
            return Err(PhmError::InvalidArguments {
                table_size,
                max_assoc_bytes,
            });
        }
        if table_size > u32::MAX as i64 || max_assoc_bytes > u32::MAX as i64 {
            return Err(PhmError::InvalidArguments {
                table_size,
                max_assoc_bytes,
            });
        }

        let table_size = table_size as u32;
        let requested = max_assoc_bytes as u32;
        let rounded = layout::round_up_to_8(requested);
        if rounded != requested {
            eprintln!("Rounding up max_assoc_bytes from {requested} to {rounded}");
        }

        let region = Region::create(path.as_ref(), table_size, rounded)?;
        Ok(Table { region })
    }

    /// Open an existing table file read-write, trusting its header beyond
    /// the magic/version check performed by `Region::open`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let region = Region::open(path.as_ref())?;
        Ok(Table { region })
    }

    pub fn table_size(&self) -> u32 {
        self.region.header().table_size
    }

    /// Returns the rounded-up cell size.
    pub fn max_assoc_bytes(&self) -> u32 {
        self.region.header().max_assoc_bytes
    }

    /// Byte offset of the next never-allocated payload cell, relative to
    /// the start of the payload arena.
    pub fn next_free_assoc(&self) -> u64 {
        self.region.header().next_free_assoc
    }

    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Insert or update `key` -> `value` under `hash`, with `expiry` the
    /// new entry's expiration and `now` the clock against which existing
    /// entries are soft-expired during the probe walk. See the probe
    /// engine's decision table for the full insert/update/evict policy.
    pub fn put(
        &mut self,
        hash: u64,
        key: &[u8],
        value: &[u8],
        expiry: i64,
        now: i64,
    ) -> Result<PutOutcome> {
        let max_assoc_bytes = self.region.header().max_assoc_bytes;
        if key.len() + value.len() > max_assoc_bytes as usize {
            return Err(PhmError::KeyValueTooLarge {
                key_size: key.len(),
                value_size: value.len(),
                max_assoc_bytes,
            });
        }

        let hash = remap_reserved(hash);
        let ProbeResult {
            needle,
            expired,
            lru,
            last,
        } = unsafe { probe::probe(&self.region, hash, key, now) };

        match (needle, expired) {
            (None, Some(expired_idx)) => {
                unsafe { self.write_entry(expired_idx, hash, expiry, key, value) };
                Ok(PutOutcome::Inserted)
            }
            (None, None) => {
                let last_is_empty = unsafe { (*self.region.index_slot_ptr(last)).is_empty() };
                if last_is_empty {
                    unsafe { self.append_entry(last, hash, expiry, key, value) };
                } else {
                    // Fully loaded probe chain: evict the approximate-LRU candidate.
                    let lru_idx = lru.expect("a full probe chain always yields an lru candidate");
                    unsafe { self.write_entry(lru_idx, hash, expiry, key, value) };
                }
                Ok(PutOutcome::Inserted)
            }
            (Some(needle_idx), Some(expired_idx)) => {
                // Compact: write the entry into the earlier expired slot and
                // tombstone the needle, shortening this key's probe chain.
                unsafe {
                    self.write_entry(expired_idx, hash, expiry, key, value);
                    (*self.region.index_slot_mut_ptr(needle_idx)).expiry = 0;
                }
                Ok(PutOutcome::Updated)
            }
            (Some(needle_idx), None) => {
                unsafe { self.update_value(needle_idx, expiry, value) };
                Ok(PutOutcome::Updated)
            }
        }
    }

    /// Look up `key`. Returns `None` on a miss — not an error. On a hit,
    /// applies the expiry side-effect (`new_expiry < 0`: untouched,
    /// `== 0`: tombstone, `> 0`: rewrite) and returns a zero-copy reference
    /// to the value bytes, whose lifetime is tied to this `&mut self`
    /// borrow — the borrow checker, not caller discipline, is what
    /// invalidates it at the next mutating call.
    pub fn get<'a>(&'a mut self, hash: u64, key: &[u8], new_expiry: i64) -> Result<Option<&'a [u8]>> {
        let max_assoc_bytes = self.region.header().max_assoc_bytes;
        if key.len() > max_assoc_bytes as usize {
            return Err(PhmError::KeyTooLarge {
                key_size: key.len(),
                max_assoc_bytes,
            });
        }

        let hash = remap_reserved(hash);
        // now = 0: no slot is ever classified expired (all valid expiries
        // are >= 0), and lru is unused — only needle matters here.
        let result = unsafe { probe::probe(&self.region, hash, key, 0) };
        let Some(idx) = result.needle else {
            return Ok(None);
        };

        unsafe {
            let slot_ptr = self.region.index_slot_mut_ptr(idx);
            if new_expiry > 0 {
                (*slot_ptr).expiry = new_expiry;
            } else if new_expiry == 0 {
                (*slot_ptr).expiry = 0;
            }
            // new_expiry < 0: leave expiry untouched.

            let assoc_offset = (*slot_ptr).assoc_offset;
            let cell_ptr = self.region.payload_cell_ptr(assoc_offset);
            let cell = &*(cell_ptr as *const CellHeader);
            let value_ptr = cell_ptr.add(layout::CELL_HEADER_SIZE + cell.key_size as usize);
            Ok(Some(std::slice::from_raw_parts(
                value_ptr,
                cell.value_size as usize,
            )))
        }
    }

    /// In-order iteration over every live (non-tombstoned) entry.
    pub fn iter(&self) -> crate::iter::Iter<'_> {
        crate::iter::Iter::new(&self.region)
    }

    /// Write a brand-new entry into a slot that already owns an allocated
    /// payload cell (an expired/tombstoned or evicted slot).
    ///
    /// # Safety
    /// `idx` must be `< table_size` and its current `assoc_offset` must be
    /// a previously-allocated, in-range cell.
    unsafe fn write_entry(&mut self, idx: u32, hash: u64, expiry: i64, key: &[u8], value: &[u8]) {
        let slot_ptr = self.region.index_slot_mut_ptr(idx);
        let assoc_offset = (*slot_ptr).assoc_offset;
        (*slot_ptr).hash = hash;
        (*slot_ptr).expiry = expiry;
        self.write_payload(assoc_offset, key, value);
    }

    /// Allocate a fresh payload cell at `next_free_assoc` and write a new
    /// entry into `idx` (a never-written slot).
    ///
    /// # Safety
    /// `idx` must be `< table_size` and currently empty.
    unsafe fn append_entry(&mut self, idx: u32, hash: u64, expiry: i64, key: &[u8], value: &[u8]) {
        let header = self.region.header_mut();
        let offset = header.next_free_assoc;
        let max_assoc_bytes = header.max_assoc_bytes;
        let table_size = header.table_size;
        debug_assert!(
            offset < max_assoc_bytes as u64 * table_size as u64,
            "arena exhausted: append branch ran more than table_size times"
        );
        header.next_free_assoc += max_assoc_bytes as u64;

        let slot_ptr = self.region.index_slot_mut_ptr(idx);
        (*slot_ptr).hash = hash;
        (*slot_ptr).expiry = expiry;
        (*slot_ptr).assoc_offset = offset;
        self.write_payload(offset, key, value);
    }

    /// Rewrite `expiry` and the value bytes of an existing entry in place,
    /// leaving its key and payload cell untouched.
    ///
    /// # Safety
    /// `idx` must be `< table_size` and currently occupied.
    unsafe fn update_value(&mut self, idx: u32, expiry: i64, value: &[u8]) {
        let slot_ptr = self.region.index_slot_mut_ptr(idx);
        (*slot_ptr).expiry = expiry;
        let assoc_offset = (*slot_ptr).assoc_offset;

        let cell_ptr = self.region.payload_cell_mut_ptr(assoc_offset);
        let cell = &mut *(cell_ptr as *mut CellHeader);
        cell.value_size = value.len() as u32;
        let value_dest = cell_ptr.add(layout::CELL_HEADER_SIZE + cell.key_size as usize);
        std::ptr::copy_nonoverlapping(value.as_ptr(), value_dest, value.len());
    }

    /// Write `key_size`, `value_size`, key bytes, and value bytes into the
    /// cell at `offset`.
    ///
    /// # Safety
    /// `offset` must be a valid, in-range cell large enough for
    /// `key.len() + value.len()` (checked by callers in `put`).
    unsafe fn write_payload(&mut self, offset: u64, key: &[u8], value: &[u8]) {
        let cell_ptr = self.region.payload_cell_mut_ptr(offset);
        let cell = &mut *(cell_ptr as *mut CellHeader);
        cell.key_size = key.len() as u32;
        cell.value_size = value.len() as u32;
        let key_dest = cell_ptr.add(layout::CELL_HEADER_SIZE);
        std::ptr::copy_nonoverlapping(key.as_ptr(), key_dest, key.len());
        let value_dest = key_dest.add(key.len());
        std::ptr::copy_nonoverlapping(value.as_ptr(), value_dest, value.len());
    }
}

/// Hash 0 is reserved to mean "slot never written"; remap it to 1 exactly
/// like the reference implementation, in both `put` and `get`.
#[inline]
fn remap_reserved(hash: u64) -> u64 {
    if hash == RESERVED_HASH {
        1
    } else {
        hash
    }
}
