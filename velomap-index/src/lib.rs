//! # Velomap Index - Fixed-Page R-Tree for Bike Map Data
//!
//! This crate stores points of interest and named ways in an R-tree laid out
//! as 512-byte pages, so a small device can answer "what is near me" by
//! reading only the few pages a query touches.
//!
//! ## Features
//!
//! - **Fixed Pages**: Every node is one 512-byte big-endian page
//! - **Two Leaf Kinds**: Bare points share point-leaves; each way gets its own page
//! - **Build Then Read**: Build in memory, flush once, search from disk
//! - **Lazy Search**: Pages are decoded one at a time as results are consumed
//! - **LRU Cache**: Recently used pages kept in memory
//! - **Thread Safe Reads**: A read-only index can be searched from many threads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use velomap_index::{IndexBuilder, IndexReader, MemoryDevice, Point, Rect, TreeConfig, Way};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = IndexBuilder::new(TreeConfig::default())?;
//! builder.insert(Point::from_degrees(5.9, 52.1))?;
//! builder.insert(Way::new(
//!     vec![Point::new(0, 0), Point::new(10, 5), Point::new(20, 0)],
//!     "Elm St",
//!     0x01,
//! ))?;
//!
//! let reader: IndexReader<MemoryDevice> = builder.finish(MemoryDevice::new())?;
//! for feature in reader.search(Rect::new(-5, -5, 25, 25)) {
//!     println!("{:?}", feature?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod geometry;
pub mod index;
pub mod page_tree;

pub use config::TreeConfig;
pub use geometry::{Point, Rect, FIXED_POINT_SCALE};
pub use index::{IndexBuilder, IndexReader};
pub use page_tree::{
    flush, FileDevice, FileHeader, Feature, IntegrityReport, MemoryDevice, MmapDevice, NodeArena,
    NodeKind, NodeStore, PageDevice, PageId, PageStore, PageStoreStats, PageTreeError,
    PageTreeResult, RTree, RTreeStats, Search, Way, MAX_DEGREE, MAX_POINTS, PAGE_SIZE, WAY_PAYLOAD,
};
