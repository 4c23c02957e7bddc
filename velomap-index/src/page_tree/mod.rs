//! Fixed-page R-tree for offline map features.
//!
//! The tree engine runs against any [`NodeStore`]:
//! - [`NodeArena`] holds nodes in memory while an index is built
//! - [`PageStore`] decodes 512-byte pages from a [`PageDevice`] on demand
//!
//! A finished arena tree is written out once with [`flush`]; readers then
//! search the page file lazily, one page per node visited.

pub mod arena;
pub mod flush;
pub mod node_store;
pub mod page_codec;
pub mod page_device;
pub mod page_store;
pub mod persistence;
pub mod search;
pub mod tree_constants;
pub mod tree_types;
mod split;
mod tree_impl;

pub use arena::NodeArena;
pub use flush::flush;
pub use node_store::NodeStore;
pub use page_codec::{check_way, PageBuf, PageCodec};
pub use page_device::{FileDevice, MemoryDevice, MmapDevice, PageDevice};
pub use page_store::{read_header, write_header, PageStore};
pub use persistence::IntegrityReport;
pub use search::Search;
pub use tree_constants::{
    DEFAULT_CACHE_PAGES, MAX_DEGREE, MAX_NAME_LEN, MAX_POINTS, PAGE_SIZE, WAY_PAYLOAD,
};
pub use tree_impl::RTree;
pub use tree_types::{
    ArenaIndex, Entry, Feature, FileHeader, Node, NodeKind, PageId, PageStoreStats,
    PageTreeError, PageTreeResult, RTreeStats, Way,
};
