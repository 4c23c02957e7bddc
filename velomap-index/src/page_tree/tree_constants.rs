//! Constants for the fixed-page R-tree.

/// Bytes per page. One page holds exactly one node.
pub const PAGE_SIZE: usize = 512;

/// Maximum entries in an internal page.
pub const MAX_DEGREE: usize = 25;

/// Maximum points in a point-leaf page (`MAX_DEGREE * 2.5`).
pub const MAX_POINTS: usize = MAX_DEGREE * 5 / 2;

/// Bytes of the `len` word, or of `pointlen`/`namelen`/`flags` on a way-leaf.
pub const NODE_HEADER_SIZE: usize = 4;

/// Child word followed by `x0, y0, x1, y1`.
pub const ENTRY_SIZE: usize = 20;

/// `x, y`.
pub const POINT_SIZE: usize = 8;

/// Bytes left for way points and name after the way-leaf header.
pub const WAY_PAYLOAD: usize = PAGE_SIZE - NODE_HEADER_SIZE;

/// `namelen` is a single byte.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Bit 31 of an internal entry's child word marks a way-leaf child.
pub const WAY_CHILD_BIT: u32 = 1 << 31;

/// Default read cache size of a page store, in pages.
pub const DEFAULT_CACHE_PAGES: usize = 64;

/// Default minimum split group size, as a percentage of the overflowing set.
pub const DEFAULT_MIN_FILL_PERCENT: usize = 40;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x564D_5254; // "VMRT"

/// File format version
pub const VERSION: u32 = 1;

const _: () = assert!(NODE_HEADER_SIZE + MAX_DEGREE * ENTRY_SIZE <= PAGE_SIZE);
const _: () = assert!(NODE_HEADER_SIZE + MAX_POINTS * POINT_SIZE <= PAGE_SIZE);
