//! Serializes a built arena tree to a page device.

use log::{debug, info};

use super::arena::NodeArena;
use super::page_codec::PageCodec;
use super::page_device::PageDevice;
use super::page_store::write_header;
use super::tree_impl::RTree;
use super::tree_types::{ArenaIndex, FileHeader, PageId, PageTreeError, PageTreeResult};

/// Writes every arena node to its own page and the header to page 0.
///
/// Arena index `i` becomes page `i + 1`, so pages appear in allocation order
/// and every child reference is rewritten to the child's page id. Node pages
/// are written before the header; the device is synced last. Nothing is
/// written if the tree has more nodes than a page id can address.
pub fn flush<D: PageDevice>(tree: &RTree<NodeArena>, device: &D) -> PageTreeResult<FileHeader> {
    let arena = tree.store();
    let node_count = arena.len();
    if node_count > PageId::MAX.0 as usize {
        return Err(PageTreeError::CapacityExceeded {
            what: "page store",
            len: node_count,
            capacity: PageId::MAX.0 as usize,
        });
    }

    let codec = PageCodec::from_config(tree.config());
    for (index, node) in arena.iter() {
        let page = page_of(index, node_count)?;
        let node = node
            .clone()
            .map_refs(|child| page_of(child, node_count))?;
        device.write_block(page, &codec.encode(&node)?)?;
    }
    debug!("Wrote {} node pages", node_count);

    let header = FileHeader {
        root_page: page_of(tree.root(), node_count)?,
        root_kind: tree.root_kind(),
        height: tree.height(),
        page_count: node_count as u32 + 1,
        feature_count: tree.len(),
        bounds: tree.bounds()?,
        ..FileHeader::new(codec.degree(), codec.point_capacity())
    };
    let header = write_header(device, &header)?;
    device.sync()?;

    info!(
        "Flushed index: {} features in {} pages, height {}",
        header.feature_count, header.page_count, header.height
    );
    Ok(header)
}

fn page_of(index: ArenaIndex, node_count: usize) -> PageTreeResult<PageId> {
    if index.index() >= node_count {
        return Err(PageTreeError::InvalidReference(format!(
            "{} outside arena of {} nodes",
            index, node_count
        )));
    }
    Ok(PageId(index.index() as u32 + 1))
}
