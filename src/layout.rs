//! `#[repr(C)]` structures that live in the memory-mapped file.
//!
//! All structs use fixed-size fields so the layout is identical across
//! compilations and processes on the same architecture. Byte order is the
//! host's — this is an in-place binary store, not a portable archive.

/// Magic bytes at the start of the header, used by `open` to reject
/// obviously-wrong files early. Not a substitute for structural validation,
/// which this format does not perform.
pub const MAGIC: [u8; 8] = *b"PHMTBL01";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Sentinel for "slot has never been written", both for `hash` and as the
/// paired condition with `expiry == 0` that defines an empty slot.
pub const RESERVED_HASH: u64 = 0;

/// Header lives at offset 0 of the mapped region.
///
/// The single 8-byte-aligned field (`next_free_assoc`) falls on an offset
/// that's already a multiple of 8, so `#[repr(C)]` introduces no implicit
/// padding here.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: [u8; 8],         // 0..8
    pub version: u32,           // 8..12
    pub _reserved: u32,         // 12..16 (alignment padding, unused)
    pub table_size: u32,        // 16..20
    pub max_assoc_bytes: u32,   // 20..24
    pub next_free_assoc: u64,   // 24..32
}

pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();
const _: () = assert!(HEADER_SIZE == 32);
const _: () = assert!(HEADER_SIZE % 8 == 0);

/// One slot in the open-addressed index. The probe engine (`crate::probe`)
/// walks an array of these.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IndexSlot {
    pub hash: u64,         // 0..8   (0 = never written)
    pub expiry: i64,       // 8..16  (0 = empty/tombstoned)
    pub assoc_offset: u64, // 16..24 (byte offset into the payload arena)
}

pub const INDEX_SLOT_SIZE: usize = std::mem::size_of::<IndexSlot>();
const _: () = assert!(INDEX_SLOT_SIZE == 24);

impl IndexSlot {
    /// "Never written" — the unique state with both hash and expiry zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.expiry == 0 && self.hash == RESERVED_HASH
    }
}

/// Prefix of every payload cell in the arena: `key_size`, `value_size`,
/// followed immediately by `key_size` bytes of key and `value_size` bytes
/// of value. The remainder of the cell (up to `max_assoc_bytes`) is unused
/// padding.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CellHeader {
    pub key_size: u32,   // 0..4
    pub value_size: u32, // 4..8
}

pub const CELL_HEADER_SIZE: usize = std::mem::size_of::<CellHeader>();
const _: () = assert!(CELL_HEADER_SIZE == 8);

/// Round `m` up to the nearest multiple of 8, matching the reference
/// implementation's rounding of `max_assoc_bytes`.
#[inline]
pub fn round_up_to_8(m: u32) -> u32 {
    let rem = m % 8;
    if rem == 0 {
        m
    } else {
        m + (8 - rem)
    }
}

/// Offset of the index array from the start of the region.
#[inline]
pub fn index_offset() -> usize {
    HEADER_SIZE
}

/// Offset of the payload arena from the start of the region.
#[inline]
pub fn payload_offset(table_size: u32) -> usize {
    HEADER_SIZE + table_size as usize * INDEX_SLOT_SIZE
}

/// Total required length of the mapped file.
#[inline]
pub fn region_size(table_size: u32, max_assoc_bytes: u32) -> usize {
    HEADER_SIZE
        + table_size as usize * INDEX_SLOT_SIZE
        + table_size as usize * max_assoc_bytes as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_is_idempotent_on_multiples_of_8() {
        for m in [0, 8, 16, 104, 4096] {
            assert_eq!(round_up_to_8(m), m);
        }
    }

    #[test]
    fn round_up_rounds_to_next_multiple() {
        assert_eq!(round_up_to_8(1), 8);
        assert_eq!(round_up_to_8(7), 8);
        assert_eq!(round_up_to_8(9), 16);
        assert_eq!(round_up_to_8(100), 104);
    }

    #[test]
    fn region_size_matches_reference_formula() {
        assert_eq!(region_size(10, 104), 32 + 24 * 10 + 104 * 10);
    }
}
