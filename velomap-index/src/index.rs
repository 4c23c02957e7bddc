//! Build-then-read facade over the page tree.
//!
//! An [`IndexBuilder`] accumulates features in memory and writes them out
//! once; an [`IndexReader`] answers window queries against the written pages
//! without loading more than it visits.

use std::path::Path;

use log::info;

use crate::config::TreeConfig;
use crate::geometry::{Point, Rect};
use crate::page_tree::{
    flush, FileDevice, FileHeader, Feature, IntegrityReport, MmapDevice, NodeArena, PageDevice,
    PageStore, PageStoreStats, PageTreeResult, RTree, RTreeStats, Search, Way,
};

/// Collects features into an in-memory tree and flushes it to a page device.
pub struct IndexBuilder {
    tree: RTree<NodeArena>,
}

impl IndexBuilder {
    pub fn new(config: TreeConfig) -> PageTreeResult<Self> {
        Ok(Self {
            tree: RTree::new(NodeArena::new(), config)?,
        })
    }

    pub fn insert(&mut self, feature: impl Into<Feature>) -> PageTreeResult<()> {
        self.tree.insert(feature)
    }

    pub fn insert_point(&mut self, point: Point) -> PageTreeResult<()> {
        self.tree.insert_point(point)
    }

    pub fn insert_way(&mut self, way: Way) -> PageTreeResult<()> {
        self.tree.insert_way(way)
    }

    /// Inserts every feature, stopping at the first rejected one.
    pub fn extend<I, F>(&mut self, features: I) -> PageTreeResult<()>
    where
        I: IntoIterator<Item = F>,
        F: Into<Feature>,
    {
        for feature in features {
            self.tree.insert(feature)?;
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The in-memory tree, searchable before it is written.
    pub fn tree(&self) -> &RTree<NodeArena> {
        &self.tree
    }

    /// Writes the tree to `device` and reopens it read-only.
    pub fn finish<D: PageDevice>(self, device: D) -> PageTreeResult<IndexReader<D>> {
        let cache_pages = self.tree.config().cache_pages();
        flush(&self.tree, &device)?;
        IndexReader::with_cache(device, cache_pages)
    }

    /// Writes the tree to a new page file at `path`.
    pub fn write_to_path(self, path: &Path) -> PageTreeResult<FileHeader> {
        let device = FileDevice::create(path)?;
        let header = flush(&self.tree, &device)?;
        info!("Index written to {}", path.display());
        Ok(header)
    }
}

/// Read-only view of a written index.
pub struct IndexReader<D: PageDevice> {
    tree: RTree<PageStore<D>>,
}

impl IndexReader<FileDevice> {
    /// Opens a page file with positioned reads.
    pub fn open_path(path: &Path) -> PageTreeResult<Self> {
        Self::open(FileDevice::open_read_only(path)?)
    }
}

impl IndexReader<MmapDevice> {
    /// Opens a page file through a read-only memory map.
    pub fn open_mmap(path: &Path) -> PageTreeResult<Self> {
        Self::open(MmapDevice::open(path)?)
    }
}

impl<D: PageDevice> IndexReader<D> {
    pub fn open(device: D) -> PageTreeResult<Self> {
        Self::with_cache(device, TreeConfig::default().cache_pages())
    }

    pub fn with_cache(device: D, cache_pages: usize) -> PageTreeResult<Self> {
        Ok(Self {
            tree: PageStore::open(device, cache_pages)?.into_tree()?,
        })
    }

    /// Lazily yields features whose bounding rectangle intersects `query`.
    pub fn search(&self, query: Rect) -> Search<'_, PageStore<D>> {
        self.tree.search(query)
    }

    /// Collects every result of [`search`](Self::search), failing on the first error.
    pub fn search_all(&self, query: Rect) -> PageTreeResult<Vec<Feature>> {
        self.tree.search(query).collect()
    }

    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn height(&self) -> u32 {
        self.tree.height()
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.tree.store().header().bounds
    }

    pub fn header(&self) -> &FileHeader {
        self.tree.store().header()
    }

    pub fn stats(&self) -> RTreeStats {
        self.tree.stats()
    }

    pub fn page_stats(&self) -> PageStoreStats {
        self.tree.store().stats()
    }

    pub fn check_integrity(&self) -> PageTreeResult<IntegrityReport> {
        self.tree.check_integrity()
    }

    pub fn collect_rects(&self) -> PageTreeResult<Vec<(u32, Rect)>> {
        self.tree.collect_rects()
    }

    pub fn tree(&self) -> &RTree<PageStore<D>> {
        &self.tree
    }
}
