//! Bit-exact conversion between [`Node`]s and 512-byte pages.
//!
//! Layouts (all integers big-endian, unused tail zeroed):
//!
//! ```text
//! internal    | len: i32 | len x { child: u32, x0: i32, y0: i32, x1: i32, y1: i32 } |
//! point-leaf  | len: i32 | len x { x: i32, y: i32 } |
//! way-leaf    | pointlen: u16 | namelen: u8 | flags: u8 | pointlen x { x, y } | name |
//! ```
//!
//! A page has no type tag. `decode` is told which layout to expect; bit 31 of
//! an internal entry's child word is how a parent tells its reader that a
//! leaf child is a way-leaf rather than a point-leaf.

use super::tree_constants::{
    ENTRY_SIZE, MAX_DEGREE, MAX_NAME_LEN, MAX_POINTS, NODE_HEADER_SIZE, PAGE_SIZE, POINT_SIZE,
    WAY_CHILD_BIT, WAY_PAYLOAD,
};
use super::tree_types::{
    Entry, Node, NodeKind, PageId, PageTreeError, PageTreeResult, Way,
};
use crate::config::TreeConfig;
use crate::geometry::{Point, Rect};

/// One serialized page.
pub type PageBuf = [u8; PAGE_SIZE];

/// Encodes and decodes nodes against a pair of capacity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCodec {
    degree: usize,
    point_capacity: usize,
}

impl PageCodec {
    /// Codec enforcing the given capacities, clamped to the physical page limits.
    pub fn new(degree: usize, point_capacity: usize) -> Self {
        Self {
            degree: degree.min(MAX_DEGREE),
            point_capacity: point_capacity.min(MAX_POINTS),
        }
    }

    pub fn from_config(config: &TreeConfig) -> Self {
        Self::new(config.degree(), config.point_capacity())
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn point_capacity(&self) -> usize {
        self.point_capacity
    }

    pub fn encode(&self, node: &Node<PageId>) -> PageTreeResult<PageBuf> {
        let mut page = [0u8; PAGE_SIZE];
        match node {
            Node::Internal { entries } => {
                check_len("internal node", entries.len(), self.degree)?;
                put_i32(&mut page, 0, entries.len() as i32);
                for (i, entry) in entries.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * ENTRY_SIZE;
                    put_u32(&mut page, at, child_word(entry)?);
                    put_rect(&mut page, at + 4, &entry.rect);
                }
            }
            Node::Points { points } => {
                check_len("point-leaf", points.len(), self.point_capacity)?;
                put_i32(&mut page, 0, points.len() as i32);
                put_points(&mut page, NODE_HEADER_SIZE, points);
            }
            Node::Way { way } => {
                check_way(way)?;
                page[0..2].copy_from_slice(&(way.points.len() as u16).to_be_bytes());
                page[2] = way.name.len() as u8;
                page[3] = way.flags;
                let name_at = put_points(&mut page, NODE_HEADER_SIZE, &way.points);
                page[name_at..name_at + way.name.len()].copy_from_slice(way.name.as_bytes());
            }
        }
        Ok(page)
    }

    pub fn decode(&self, page: &[u8], kind: NodeKind) -> PageTreeResult<Node<PageId>> {
        if page.len() != PAGE_SIZE {
            return Err(PageTreeError::CorruptPage(format!(
                "page is {} bytes, expected {}",
                page.len(),
                PAGE_SIZE
            )));
        }

        match kind {
            NodeKind::Internal => {
                let len = read_len(page, "internal node", self.degree)?;
                let mut entries = Vec::with_capacity(len);
                for i in 0..len {
                    let at = NODE_HEADER_SIZE + i * ENTRY_SIZE;
                    let word = get_u32(page, at);
                    if word == PageId::NONE.0 {
                        return Err(PageTreeError::CorruptPage(format!(
                            "entry {} has no child",
                            i
                        )));
                    }
                    let child = PageId(word & !WAY_CHILD_BIT);
                    if child == PageId::HEADER {
                        return Err(PageTreeError::CorruptPage(format!(
                            "entry {} points at the header page",
                            i
                        )));
                    }
                    let rect = get_rect(page, at + 4)?;
                    entries.push(Entry::new(rect, child, word & WAY_CHILD_BIT != 0));
                }
                Ok(Node::Internal { entries })
            }
            NodeKind::Points => {
                let len = read_len(page, "point-leaf", self.point_capacity)?;
                Ok(Node::Points {
                    points: get_points(page, NODE_HEADER_SIZE, len),
                })
            }
            NodeKind::Way => {
                let point_len = u16::from_be_bytes([page[0], page[1]]) as usize;
                let name_len = page[2] as usize;
                let needed = point_len * POINT_SIZE + name_len;
                if needed > WAY_PAYLOAD {
                    return Err(PageTreeError::CorruptPage(format!(
                        "way declares {} points and {} name bytes, payload is {} bytes",
                        point_len, name_len, WAY_PAYLOAD
                    )));
                }
                let points = get_points(page, NODE_HEADER_SIZE, point_len);
                let name_at = NODE_HEADER_SIZE + point_len * POINT_SIZE;
                let name = String::from_utf8(page[name_at..name_at + name_len].to_vec())
                    .map_err(|e| PageTreeError::CorruptPage(format!("way name: {}", e)))?;
                Ok(Node::Way {
                    way: Way {
                        points,
                        name,
                        flags: page[3],
                    },
                })
            }
        }
    }
}

impl Default for PageCodec {
    fn default() -> Self {
        Self::new(MAX_DEGREE, MAX_POINTS)
    }
}

/// Checks that a way fits a single way-leaf page.
pub fn check_way(way: &Way) -> PageTreeResult<()> {
    if way.name.len() > MAX_NAME_LEN {
        return Err(PageTreeError::FeatureTooLarge {
            needed: way.name.len(),
            available: MAX_NAME_LEN,
        });
    }
    if way.payload_len() > WAY_PAYLOAD {
        return Err(PageTreeError::FeatureTooLarge {
            needed: way.payload_len(),
            available: WAY_PAYLOAD,
        });
    }
    Ok(())
}

fn check_len(what: &'static str, len: usize, capacity: usize) -> PageTreeResult<()> {
    if len > capacity {
        return Err(PageTreeError::CapacityExceeded {
            what,
            len,
            capacity,
        });
    }
    Ok(())
}

fn child_word(entry: &Entry<PageId>) -> PageTreeResult<u32> {
    if entry.child == PageId::HEADER || entry.child > PageId::MAX {
        return Err(PageTreeError::InvalidReference(format!(
            "{} cannot be stored as a child",
            entry.child
        )));
    }
    Ok(if entry.way {
        entry.child.0 | WAY_CHILD_BIT
    } else {
        entry.child.0
    })
}

fn read_len(page: &[u8], what: &str, capacity: usize) -> PageTreeResult<usize> {
    let len = get_i32(page, 0);
    if len < 0 || len as usize > capacity {
        return Err(PageTreeError::CorruptPage(format!(
            "{} declares {} entries, capacity is {}",
            what, len, capacity
        )));
    }
    Ok(len as usize)
}

fn put_u32(page: &mut [u8], at: usize, v: u32) {
    page[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn put_i32(page: &mut [u8], at: usize, v: i32) {
    page[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn get_u32(page: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([page[at], page[at + 1], page[at + 2], page[at + 3]])
}

fn get_i32(page: &[u8], at: usize) -> i32 {
    get_u32(page, at) as i32
}

fn put_rect(page: &mut [u8], at: usize, rect: &Rect) {
    put_i32(page, at, rect.x0);
    put_i32(page, at + 4, rect.y0);
    put_i32(page, at + 8, rect.x1);
    put_i32(page, at + 12, rect.y1);
}

fn get_rect(page: &[u8], at: usize) -> PageTreeResult<Rect> {
    let rect = Rect {
        x0: get_i32(page, at),
        y0: get_i32(page, at + 4),
        x1: get_i32(page, at + 8),
        y1: get_i32(page, at + 12),
    };
    if rect.x0 > rect.x1 || rect.y0 > rect.y1 {
        return Err(PageTreeError::CorruptPage(format!("inverted {}", rect)));
    }
    Ok(rect)
}

/// Writes `points` from `at`, returns the offset just past them.
fn put_points(page: &mut [u8], at: usize, points: &[Point]) -> usize {
    let mut at = at;
    for p in points {
        put_i32(page, at, p.x);
        put_i32(page, at + 4, p.y);
        at += POINT_SIZE;
    }
    at
}

fn get_points(page: &[u8], at: usize, len: usize) -> Vec<Point> {
    (0..len)
        .map(|i| {
            let at = at + i * POINT_SIZE;
            Point::new(get_i32(page, at), get_i32(page, at + 4))
        })
        .collect()
}
