//! Page-addressed node store over a [`PageDevice`].
//!
//! Page 0 carries the [`FileHeader`]; node pages start at 1. Nodes are
//! decoded on demand, one page per read, and kept in a bounded LRU cache.
//! A store opened read-only rejects every mutation with `ReadOnly` and can be
//! shared by any number of concurrent readers.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bincode::config::Config;
use log::{debug, trace};
use lru::LruCache;
use parking_lot::Mutex;

use super::node_store::NodeStore;
use super::page_codec::PageCodec;
use super::page_device::PageDevice;
use super::tree_constants::{DEFAULT_CACHE_PAGES, MAGIC, PAGE_SIZE};
use super::tree_impl::RTree;
use super::tree_types::{
    FileHeader, Node, NodeKind, PageId, PageStoreStats, PageTreeError, PageTreeResult,
};
use crate::config::TreeConfig;

fn header_config() -> impl Config {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

fn encode_header(header: &FileHeader) -> PageTreeResult<Vec<u8>> {
    bincode::serde::encode_to_vec(header, header_config())
        .map_err(|e| PageTreeError::Serialization(e.to_string()))
}

/// CRC32 of the header serialized with a zero checksum field.
fn header_checksum(header: &FileHeader) -> PageTreeResult<u32> {
    let mut unsealed = header.clone();
    unsealed.checksum = 0;
    Ok(crc32fast::hash(&encode_header(&unsealed)?))
}

/// Seals `header` with its checksum and writes it to page 0.
///
/// Returns the header as written, checksum included.
pub fn write_header<D: PageDevice>(device: &D, header: &FileHeader) -> PageTreeResult<FileHeader> {
    let mut sealed = header.clone();
    sealed.checksum = header_checksum(header)?;
    let bytes = encode_header(&sealed)?;
    if bytes.len() > PAGE_SIZE {
        return Err(PageTreeError::Serialization(format!(
            "Header too large: {} bytes (max {})",
            bytes.len(),
            PAGE_SIZE
        )));
    }

    let mut page = [0u8; PAGE_SIZE];
    page[..bytes.len()].copy_from_slice(&bytes);
    device.write_block(PageId::HEADER, &page)?;
    Ok(sealed)
}

/// Reads page 0 and verifies magic, checksum and field ranges.
pub fn read_header<D: PageDevice>(device: &D) -> PageTreeResult<FileHeader> {
    let mut page = [0u8; PAGE_SIZE];
    device.read_block(PageId::HEADER, &mut page)?;
    let (header, _): (FileHeader, usize) =
        bincode::serde::decode_from_slice(&page, header_config())
            .map_err(|e| PageTreeError::Serialization(e.to_string()))?;

    if header.magic != MAGIC {
        return Err(PageTreeError::InvalidHeader(
            "Invalid file format (bad magic)".into(),
        ));
    }
    let expected = header_checksum(&header)?;
    if header.checksum != expected {
        return Err(PageTreeError::InvalidHeader(format!(
            "Header checksum mismatch: stored {:#010x}, computed {:#010x}",
            header.checksum, expected
        )));
    }
    header.validate()?;
    Ok(header)
}

/// Thread-safe I/O counters
#[derive(Debug, Default)]
struct PageStoreStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

/// Node store backed by fixed-size pages on a [`PageDevice`].
pub struct PageStore<D: PageDevice> {
    device: D,
    codec: PageCodec,
    header: FileHeader,
    cache: Mutex<LruCache<PageId, Node<PageId>>>,
    stats: PageStoreStatistics,
    writable: bool,
}

impl<D: PageDevice> PageStore<D> {
    /// Opens an existing page store for reading only.
    pub fn open(device: D, cache_pages: usize) -> PageTreeResult<Self> {
        Self::open_with(device, cache_pages, false)
    }

    /// Opens an existing page store for exclusive in-place updates.
    pub fn open_writable(device: D, cache_pages: usize) -> PageTreeResult<Self> {
        Self::open_with(device, cache_pages, true)
    }

    /// Starts an empty writable page store holding only a header.
    pub fn create(device: D, config: &TreeConfig) -> PageTreeResult<Self> {
        config.validate()?;
        let header = write_header(
            &device,
            &FileHeader::new(config.degree(), config.point_capacity()),
        )?;
        debug!("Created page store for {:?}", config);
        Ok(Self::with_header(device, header, config.cache_pages(), true))
    }

    fn open_with(device: D, cache_pages: usize, writable: bool) -> PageTreeResult<Self> {
        let header = read_header(&device)?;
        let blocks = device.block_count()?;
        if blocks < header.page_count as u64 {
            return Err(PageTreeError::InvalidHeader(format!(
                "Header claims {} pages but device holds {}",
                header.page_count, blocks
            )));
        }
        debug!(
            "Opened page store: {} pages, {} features, height {}",
            header.page_count, header.feature_count, header.height
        );
        Ok(Self::with_header(device, header, cache_pages, writable))
    }

    fn with_header(device: D, header: FileHeader, cache_pages: usize, writable: bool) -> Self {
        let codec = PageCodec::new(header.degree as usize, header.point_capacity as usize);
        let capacity = NonZeroUsize::new(cache_pages)
            .or(NonZeroUsize::new(DEFAULT_CACHE_PAGES))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            device,
            codec,
            header,
            cache: Mutex::new(LruCache::new(capacity)),
            stats: PageStoreStatistics::default(),
            writable,
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Tree configuration recorded in the header.
    pub fn config(&self) -> TreeConfig {
        TreeConfig::new()
            .with_degree(self.header.degree as usize)
            .with_point_capacity(self.header.point_capacity as usize)
            .with_cache_pages(self.cache.lock().cap().get())
    }

    pub fn stats(&self) -> PageStoreStats {
        PageStoreStats {
            page_count: self.header.page_count,
            cached_pages: self.cache.lock().len() as u64,
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.stats.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.stats.disk_writes.load(Ordering::Relaxed),
        }
    }

    /// Drops every cached node.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Attaches a tree to the root recorded in the header.
    ///
    /// A freshly created store has no root yet; a writable one gets an empty
    /// point-leaf root, a read-only one is rejected.
    pub fn into_tree(self) -> PageTreeResult<RTree<Self>> {
        let config = self.config();
        if self.header.root_page.is_none() {
            if !self.writable {
                return Err(PageTreeError::InvalidHeader("Index has no root".into()));
            }
            return RTree::new(self, config);
        }
        let header = self.header.clone();
        RTree::from_parts(
            self,
            header.root_page,
            header.root_kind,
            header.height,
            header.feature_count,
            config,
        )
    }

    fn check_page(&self, page: PageId) -> PageTreeResult<()> {
        if page == PageId::HEADER || page.0 >= self.header.page_count {
            return Err(PageTreeError::InvalidReference(format!(
                "{} outside node pages 1..{}",
                page, self.header.page_count
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> PageTreeResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(PageTreeError::ReadOnly)
        }
    }

    fn write_node(&mut self, page: PageId, node: Node<PageId>) -> PageTreeResult<()> {
        let buf = self.codec.encode(&node)?;
        self.device.write_block(page, &buf)?;
        self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
        self.cache.get_mut().put(page, node);
        Ok(())
    }
}

impl<D: PageDevice> NodeStore for PageStore<D> {
    type Ref = PageId;

    fn get(&self, page: PageId, kind: NodeKind) -> PageTreeResult<Node<PageId>> {
        self.check_page(page)?;

        if let Some(node) = self.cache.lock().get(&page) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            if node.kind() != kind {
                return Err(PageTreeError::KindMismatch {
                    expected: kind,
                    found: node.kind(),
                });
            }
            return Ok(node.clone());
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let mut buf = [0u8; PAGE_SIZE];
        self.device.read_block(page, &mut buf)?;
        self.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
        let node = self.codec.decode(&buf, kind).map_err(|e| match e {
            PageTreeError::CorruptPage(msg) => PageTreeError::CorruptPage(format!("{}: {}", page, msg)),
            other => other,
        })?;
        trace!("Loaded {} as {:?}", page, kind);

        self.cache.lock().put(page, node.clone());
        Ok(node)
    }

    fn set(&mut self, page: PageId, value: Node<PageId>) -> PageTreeResult<()> {
        self.check_writable()?;
        self.check_page(page)?;
        self.write_node(page, value)
    }

    fn allocate(&mut self, kind: NodeKind) -> PageTreeResult<PageId> {
        self.check_writable()?;
        let page = PageId(self.header.page_count);
        if page > PageId::MAX {
            return Err(PageTreeError::CapacityExceeded {
                what: "page store",
                len: page.0 as usize,
                capacity: PageId::MAX.0 as usize,
            });
        }
        self.write_node(page, Node::empty(kind))?;
        self.header.page_count += 1;
        Ok(page)
    }
}

impl<D: PageDevice> RTree<PageStore<D>> {
    /// Creates an empty index on `device` and records it in the header.
    pub fn create(device: D, config: TreeConfig) -> PageTreeResult<Self> {
        let mut tree = PageStore::create(device, &config)?.into_tree()?;
        tree.commit()?;
        Ok(tree)
    }

    /// Opens the index stored on `device` for in-place inserts.
    pub fn open_writable(device: D, cache_pages: usize) -> PageTreeResult<Self> {
        PageStore::open_writable(device, cache_pages)?.into_tree()
    }

    /// Records root, height, feature count and bounds in the header and syncs.
    pub fn commit(&mut self) -> PageTreeResult<FileHeader> {
        self.store().check_writable()?;
        let bounds = self.bounds()?;
        let (root, root_kind, height, len) =
            (self.root(), self.root_kind(), self.height(), self.len());

        let store = self.store_mut();
        store.header.root_page = root;
        store.header.root_kind = root_kind;
        store.header.height = height;
        store.header.feature_count = len;
        store.header.bounds = bounds;
        store.header = write_header(&store.device, &store.header)?;
        store.device.sync()?;
        debug!(
            "Committed index: {} features, height {}, {} pages",
            len, height, store.header.page_count
        );
        Ok(store.header.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};
    use crate::page_tree::page_device::MemoryDevice;
    use crate::page_tree::tree_types::{Feature, Way};

    fn everything() -> Rect {
        Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn small_config() -> TreeConfig {
        TreeConfig::new().with_degree(4).with_point_capacity(4)
    }

    #[test]
    fn test_header_round_trip_and_checksum() {
        let device = MemoryDevice::new();
        let mut header = FileHeader::new(10, 20);
        header.bounds = Some(Rect::new(-1, -2, 3, 4));
        write_header(&device, &header).unwrap();

        let read = read_header(&device).unwrap();
        assert_eq!(read.bounds, header.bounds);
        assert_eq!(read.degree, 10);
        assert_ne!(read.checksum, 0);

        let mut bytes = device.into_bytes();
        // Flip a bit inside the degree field, past magic and version.
        bytes[15] ^= 0x01;
        let device = MemoryDevice::from_bytes(bytes);
        assert!(matches!(
            read_header(&device),
            Err(PageTreeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_header_is_big_endian() {
        let device = MemoryDevice::new();
        write_header(&device, &FileHeader::default()).unwrap();
        let bytes = device.into_bytes();
        assert_eq!(&bytes[0..4], &[0x56, 0x4D, 0x52, 0x54]);
    }

    #[test]
    fn test_open_rejects_blank_device() {
        let device = MemoryDevice::from_bytes(vec![0u8; PAGE_SIZE]);
        assert!(matches!(
            PageStore::open(device, 8),
            Err(PageTreeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_writable_tree_commit_and_reopen() {
        let mut tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        for i in 0..40 {
            tree.insert(Point::new(i, i * 2)).unwrap();
        }
        tree.insert(Way::new(vec![Point::new(0, 0), Point::new(5, 5)], "Elm St", 1))
            .unwrap();
        let header = tree.commit().unwrap();
        assert_eq!(header.feature_count, 41);
        assert_eq!(header.bounds, Some(Rect::new(0, 0, 39, 78)));

        let device = tree.into_store().into_device();
        let reader = PageStore::open(device, 16).unwrap().into_tree().unwrap();
        assert_eq!(reader.len(), 41);
        let found: Vec<Feature> = reader
            .search(Rect::new(4, 4, 4, 4))
            .collect::<PageTreeResult<_>>()
            .unwrap();
        assert!(found.contains(&Feature::Way(Way::new(
            vec![Point::new(0, 0), Point::new(5, 5)],
            "Elm St",
            1
        ))));
        assert!(reader.check_integrity().unwrap().is_valid);
    }

    #[test]
    fn test_read_only_store_rejects_writes() {
        let tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        let device = tree.into_store().into_device();
        let mut tree = PageStore::open(device, 8).unwrap().into_tree().unwrap();
        assert!(matches!(
            tree.insert(Point::new(1, 1)),
            Err(PageTreeError::ReadOnly)
        ));
        assert!(matches!(tree.commit(), Err(PageTreeError::ReadOnly)));
    }

    #[test]
    fn test_out_of_range_page_is_invalid_reference() {
        let tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        let store = tree.into_store();
        assert!(matches!(
            store.get(PageId(0), NodeKind::Points),
            Err(PageTreeError::InvalidReference(_))
        ));
        assert!(matches!(
            store.get(PageId(2), NodeKind::Points),
            Err(PageTreeError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_cache_hits_and_lazy_reads() {
        let mut tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        for i in 0..100 {
            tree.insert(Point::new(i % 10, i / 10)).unwrap();
        }
        tree.commit().unwrap();
        let device = tree.into_store().into_device();

        let reader = PageStore::open(device, 64).unwrap().into_tree().unwrap();
        assert_eq!(reader.store().stats().disk_reads, 0);

        let first = reader.search(everything()).next().unwrap().unwrap();
        assert!(matches!(first, Feature::Point(_)));
        let after_first = reader.store().stats().disk_reads;
        assert_eq!(after_first, reader.height() as u64);

        let total = reader.search(everything()).count();
        assert_eq!(total, 100);
        let stats = reader.store().stats();
        assert!(stats.cache_hits >= after_first);
        assert_eq!(stats.disk_reads, stats.cache_misses);
    }

    #[test]
    fn test_corrupt_page_surfaces_in_search() {
        init_logging();
        let mut tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        for i in 0..20 {
            tree.insert(Point::new(i, i)).unwrap();
        }
        tree.commit().unwrap();
        let root = tree.root();
        let mut bytes = tree.into_store().into_device().into_bytes();

        // Claim more entries than the degree allows.
        let offset = root.offset() as usize;
        bytes[offset..offset + 4].copy_from_slice(&100i32.to_be_bytes());

        let reader = PageStore::open(MemoryDevice::from_bytes(bytes), 8)
            .unwrap()
            .into_tree()
            .unwrap();
        let results: Vec<_> = reader.search(everything()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(PageTreeError::CorruptPage(_))));
    }

    #[test]
    fn test_corrupt_leaf_skips_only_its_branch() {
        let config = TreeConfig::new().with_point_capacity(4);
        let mut tree = RTree::create(MemoryDevice::new(), config).unwrap();
        for i in 0..20 {
            tree.insert(Point::new(i, 0)).unwrap();
        }
        tree.commit().unwrap();
        assert_eq!(tree.height(), 2);

        let victim = tree.load_entries(tree.root()).unwrap()[0].child;
        let lost = match tree.store().get(victim, NodeKind::Points).unwrap() {
            Node::Points { points } => points.len(),
            other => panic!("Expected point-leaf, got {:?}", other),
        };
        let mut bytes = tree.into_store().into_device().into_bytes();
        let offset = victim.offset() as usize;
        bytes[offset..offset + 4].copy_from_slice(&100i32.to_be_bytes());

        let reader = PageStore::open(MemoryDevice::from_bytes(bytes), 8)
            .unwrap()
            .into_tree()
            .unwrap();
        let results: Vec<_> = reader.search(everything()).collect();
        let errors = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(errors, 1);
        assert_eq!(results.len() - errors, 20 - lost);
    }

    #[test]
    fn test_concurrent_readers() {
        let mut tree = RTree::create(MemoryDevice::new(), small_config()).unwrap();
        for i in 0..200 {
            tree.insert(Point::new(i % 20, i / 20)).unwrap();
        }
        tree.commit().unwrap();
        let reader = PageStore::open(tree.into_store().into_device(), 4)
            .unwrap()
            .into_tree()
            .unwrap();

        std::thread::scope(|s| {
            for row in 0..4 {
                let reader = &reader;
                s.spawn(move || {
                    let hits = reader
                        .search(Rect::new(0, row, 19, row))
                        .collect::<PageTreeResult<Vec<_>>>()
                        .unwrap();
                    assert_eq!(hits.len(), 20);
                });
            }
        });
    }
}
