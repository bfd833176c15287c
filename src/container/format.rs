//! Container file format constants.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "Scene"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Data ...     |
//! +------------------+
//! ```
//!
//! A group is `u64 count` followed by `count` child offsets; the top bit of an
//! offset marks data, clear marks a group. Data is `u64 size` followed by the
//! bytes. Every directory is a group whose first child is an index block
//! naming the remaining children.

/// Magic bytes at the start of a scene cache file.
pub const MAGIC: &[u8; 5] = b"Scene";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the file has been completely written.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the file is still being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Bit mask for the type flag in child offsets (set = data).
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual offset from a child pointer.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Index entry kind byte for directories.
pub const KIND_DIRECTORY: u8 = 0;

/// Index entry kind byte for leaves.
pub const KIND_LEAF: u8 = 1;

/// Index entry flag: leaf bytes are zlib-compressed.
pub const FLAG_COMPRESSED: u8 = 0x01;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}
