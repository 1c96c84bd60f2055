//! The probe engine: a single linear-probing walk over the index array that
//! simultaneously locates a matching slot, the first expired/tombstoned
//! slot, the least-recently-valid slot, and the walk's stopping point.
//!
//! Mirrors the reference implementation's `do...while (last != first)`
//! termination exactly: on a fully-loaded probe chain (no match, no empty
//! slot, every slot visited), `last` ends up equal to the starting slot —
//! a non-empty slot — which is what lets `put` distinguish "append into an
//! empty slot" from "evict the LRU candidate" (see `Table::put`).
use crate::layout::{self, CellHeader, IndexSlot};
use crate::region::Region;

/// The four outputs of one probe walk. Indices are slot positions in
/// `0..table_size`.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    /// The slot matching `(hash, key)`, if any.
    pub needle: Option<u32>,
    /// The first expired-or-tombstoned slot seen before a match/empty slot.
    pub expired: Option<u32>,
    /// The slot with the smallest `expiry` seen (the approximate-LRU
    /// eviction candidate).
    pub lru: Option<u32>,
    /// Where the walk stopped: an empty slot, or (on a full cycle) the
    /// starting slot.
    pub last: u32,
}

/// Read the slot at index `i`.
///
/// # Safety
/// `i` must be `< region.header().table_size`.
#[inline]
unsafe fn read_slot(region: &Region, i: u32) -> IndexSlot {
    *region.index_slot_ptr(i)
}

/// Compare the key stored in `slot`'s payload cell against `key`.
///
/// # Safety
/// `slot.assoc_offset` must be a valid, in-range cell offset.
unsafe fn key_matches(region: &Region, slot: &IndexSlot, key: &[u8]) -> bool {
    let cell_ptr = region.payload_cell_ptr(slot.assoc_offset);
    let cell = &*(cell_ptr as *const CellHeader);
    if cell.key_size as usize != key.len() {
        return false;
    }
    let stored_key = std::slice::from_raw_parts(cell_ptr.add(layout::CELL_HEADER_SIZE), key.len());
    stored_key == key
}

/// Walk the index starting at `hash mod table_size`, classifying each slot
/// as described in the module docs. `hash` must already have the
/// reserved-zero remap applied by the caller (`Table::put`/`Table::get`).
///
/// # Safety
/// `region` must be a fully initialized table region.
pub unsafe fn probe(region: &Region, hash: u64, key: &[u8], now: i64) -> ProbeResult {
    let table_size = region.header().table_size;
    let first = (hash % table_size as u64) as u32;

    let mut idx = first;
    let mut expired: Option<u32> = None;
    let mut lru: Option<u32> = None;
    let mut needle: Option<u32> = None;
    let mut lru_expiry = i64::MAX;
    let mut last = first;

    for _ in 0..table_size {
        let slot = read_slot(region, idx);

        if slot.hash == hash && key_matches(region, &slot, key) {
            needle = Some(idx);
            last = idx;
            break;
        }

        if slot.is_empty() {
            last = idx;
            break;
        }

        if expired.is_none() && slot.expiry < now {
            expired = Some(idx);
        }

        if slot.expiry < lru_expiry {
            lru_expiry = slot.expiry;
            lru = Some(idx);
        }

        idx = (idx + 1) % table_size;
        last = idx;
    }

    debug_assert!(expired.is_none() || expired != needle);
    debug_assert!(lru.is_none() || lru != needle);
    debug_assert!(needle.map_or(true, |n| !read_slot(region, n).is_empty()));

    ProbeResult {
        needle,
        expired,
        lru,
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use tempfile::{tempdir, TempDir};

    fn region(table_size: u32, max_assoc_bytes: u32) -> (Region, TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe_test");
        let region = Region::create(&path, table_size, max_assoc_bytes).unwrap();
        (region, dir)
    }

    /// Hand-write an occupied slot and its payload cell, bypassing `Table`
    /// entirely so these tests exercise `probe()` in isolation.
    unsafe fn write_slot(region: &mut Region, idx: u32, hash: u64, expiry: i64, key: &[u8], value: &[u8]) {
        let max_assoc_bytes = region.header().max_assoc_bytes as u64;
        let offset = idx as u64 * max_assoc_bytes;

        let slot = region.index_slot_mut_ptr(idx);
        (*slot).hash = hash;
        (*slot).expiry = expiry;
        (*slot).assoc_offset = offset;

        let cell = region.payload_cell_mut_ptr(offset);
        let cell_header = &mut *(cell as *mut CellHeader);
        cell_header.key_size = key.len() as u32;
        cell_header.value_size = value.len() as u32;
        std::ptr::copy_nonoverlapping(key.as_ptr(), cell.add(layout::CELL_HEADER_SIZE), key.len());
        std::ptr::copy_nonoverlapping(
            value.as_ptr(),
            cell.add(layout::CELL_HEADER_SIZE + key.len()),
            value.len(),
        );
    }

    #[test]
    fn empty_table_has_no_needle_expired_or_lru_and_stops_at_the_start() {
        let (region, _dir) = region(8, 32);
        let result = unsafe { probe(&region, 5, b"k", 0) };
        assert_eq!(result.needle, None);
        assert_eq!(result.expired, None);
        assert_eq!(result.lru, None);
        assert_eq!(result.last, 5);
    }

    #[test]
    fn finds_a_matching_hash_and_key() {
        let (mut region, _dir) = region(8, 32);
        unsafe { write_slot(&mut region, 0, 8, 10, b"a", b"va") };
        unsafe { write_slot(&mut region, 1, 8, 10, b"b", b"vb") };

        let result = unsafe { probe(&region, 8, b"b", 0) };
        assert_eq!(result.needle, Some(1));
        assert_eq!(result.expired, None);
    }

    #[test]
    fn a_matching_hash_with_a_different_key_keeps_probing() {
        let (mut region, _dir) = region(8, 32);
        unsafe { write_slot(&mut region, 0, 8, 10, b"a", b"va") };

        let result = unsafe { probe(&region, 8, b"not-a", 0) };
        assert_eq!(result.needle, None);
        assert_eq!(result.last, 1);
    }

    #[test]
    fn first_expired_and_smallest_expiry_lru_can_be_different_slots() {
        let (mut region, _dir) = region(8, 32);
        // Both slots 0 and 1 probe-start at 0 and are expired as of now=5,
        // but slot 0 is seen first (expired) while slot 1 has the smaller
        // expiry overall (lru).
        unsafe { write_slot(&mut region, 0, 8, 2, b"a", b"va") };
        unsafe { write_slot(&mut region, 1, 8, 1, b"b", b"vb") };
        // Slot 2 stays never-written so the walk stops there.

        let result = unsafe { probe(&region, 8, b"missing", 5) };
        assert_eq!(result.needle, None);
        assert_eq!(result.expired, Some(0));
        assert_eq!(result.lru, Some(1));
        assert_eq!(result.last, 2);
    }

    #[test]
    fn a_fully_loaded_chain_with_no_match_stops_at_the_starting_slot() {
        let (mut region, _dir) = region(4, 32);
        // All four keys probe-start at slot 0 and fill every slot; slot 2
        // has the smallest expiry and is the lru candidate.
        unsafe { write_slot(&mut region, 0, 4, 50, b"k0", b"v0") };
        unsafe { write_slot(&mut region, 1, 4, 40, b"k1", b"v1") };
        unsafe { write_slot(&mut region, 2, 4, 5, b"k2", b"v2") };
        unsafe { write_slot(&mut region, 3, 4, 60, b"k3", b"v3") };

        let result = unsafe { probe(&region, 4, b"k4", 0) };
        assert_eq!(result.needle, None);
        assert_eq!(result.expired, None);
        assert_eq!(result.lru, Some(2));
        assert_eq!(result.last, 0);
    }

    #[test]
    fn needle_is_never_reported_as_also_expired_or_lru() {
        let (mut region, _dir) = region(4, 32);
        unsafe { write_slot(&mut region, 0, 4, 1, b"k0", b"v0") };

        // now = 5 would classify slot 0 as expired were it not the needle.
        let result = unsafe { probe(&region, 4, b"k0", 5) };
        assert_eq!(result.needle, Some(0));
        assert_eq!(result.expired, None);
        assert_eq!(result.lru, None);
    }
}
