//! Core types and data structures for the fixed-page R-tree.
//!
//! This module defines the fundamental types used throughout the tree:
//! - Error types and result types
//! - Node references for the build arena and for persisted pages
//! - Node variants (internal, point-leaf, way-leaf) and features
//! - Statistics and the file header

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use super::tree_constants::{MAGIC, MAX_DEGREE, MAX_POINTS, PAGE_SIZE, VERSION, WAY_CHILD_BIT};
use crate::geometry::{Point, Rect};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while building, persisting or querying the index
#[derive(Debug, Error)]
pub enum PageTreeError {
    #[error("Capacity exceeded: {what} holds {len}, page allows {capacity}")]
    CapacityExceeded {
        what: &'static str,
        len: usize,
        capacity: usize,
    },

    #[error("Feature too large: needs {needed} bytes, page allows {available}")]
    FeatureTooLarge { needed: usize, available: usize },

    #[error("Invalid node reference: {0}")]
    InvalidReference(String),

    #[error("Corrupt page: {0}")]
    CorruptPage(String),

    #[error("Node kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: NodeKind, found: NodeKind },

    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Page store is read-only")]
    ReadOnly,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for page tree operations
pub type PageTreeResult<T> = Result<T, PageTreeError>;

// ============================================================================
// Node References
// ============================================================================

/// Index of a node inside a [`NodeArena`](super::arena::NodeArena).
///
/// Only meaningful for the arena that handed it out; it is never written to
/// disk. Flush translates it into a [`PageId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex(pub(crate) usize);

impl ArenaIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ArenaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "arena#{}", self.0)
    }
}

/// Page number inside a page store file. Page `i` starts at byte `i * PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Page 0 holds the file header.
    pub const HEADER: PageId = PageId(0);

    /// First page that holds a node.
    pub const FIRST_NODE: PageId = PageId(1);

    /// "No child" sentinel.
    pub const NONE: PageId = PageId(u32::MAX);

    /// Largest id an internal entry can reference. The all-ones child word
    /// is the "no child" sentinel, so the top 31-bit id is unusable.
    pub const MAX: PageId = PageId(WAY_CHILD_BIT - 2);

    pub fn offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

// ============================================================================
// Node Types
// ============================================================================

/// Which of the three page layouts a node uses.
///
/// Pages carry no tag; the reader supplies the kind from tree context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Internal,
    Points,
    Way,
}

impl NodeKind {
    /// Kind of a child node sitting at `child_level` (leaves are level 0).
    pub fn of_child(child_level: u32, way: bool) -> NodeKind {
        match (child_level, way) {
            (0, true) => NodeKind::Way,
            (0, false) => NodeKind::Points,
            _ => NodeKind::Internal,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Internal)
    }
}

/// A child entry of an internal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<R> {
    pub rect: Rect,
    pub child: R,
    /// The child is a way-leaf. Only meaningful one level above the leaves.
    pub way: bool,
}

impl<R> Entry<R> {
    pub fn new(rect: Rect, child: R, way: bool) -> Self {
        Self { rect, child, way }
    }
}

/// A named polyline (road or path segment) with attribute flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Way {
    pub points: Vec<Point>,
    pub name: String,
    pub flags: u8,
}

impl Way {
    pub fn new(points: Vec<Point>, name: impl Into<String>, flags: u8) -> Self {
        Self {
            points,
            name: name.into(),
            flags,
        }
    }

    pub fn bounds(&self) -> Option<Rect> {
        Rect::bounding_points(&self.points)
    }

    /// Bytes the points and name take in a way-leaf payload.
    pub fn payload_len(&self) -> usize {
        self.points.len() * super::tree_constants::POINT_SIZE + self.name.len()
    }
}

/// Node types in the tree, generic over the child reference type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<R> {
    /// Up to `degree` child entries
    Internal { entries: Vec<Entry<R>> },
    /// Up to `point_capacity` bare points
    Points { points: Vec<Point> },
    /// Exactly one named polyline
    Way { way: Way },
}

impl<R> Node<R> {
    /// An empty node of the given kind.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Internal => Node::Internal {
                entries: Vec::new(),
            },
            NodeKind::Points => Node::Points { points: Vec::new() },
            NodeKind::Way => Node::Way {
                way: Way::default(),
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Internal { .. } => NodeKind::Internal,
            Node::Points { .. } => NodeKind::Points,
            Node::Way { .. } => NodeKind::Way,
        }
    }

    /// Number of entries, points, or way points.
    pub fn len(&self) -> usize {
        match self {
            Node::Internal { entries } => entries.len(),
            Node::Points { points } => points.len(),
            Node::Way { way } => way.points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tightest rectangle over the node's content, `None` when empty.
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Node::Internal { entries } => Rect::bounding(entries.iter().map(|e| e.rect)),
            Node::Points { points } => Rect::bounding_points(points),
            Node::Way { way } => way.bounds(),
        }
    }

    /// Rewrites every child reference through `f`.
    pub fn map_refs<S, F>(self, mut f: F) -> PageTreeResult<Node<S>>
    where
        F: FnMut(R) -> PageTreeResult<S>,
    {
        Ok(match self {
            Node::Internal { entries } => Node::Internal {
                entries: entries
                    .into_iter()
                    .map(|e| Ok(Entry::new(e.rect, f(e.child)?, e.way)))
                    .collect::<PageTreeResult<Vec<_>>>()?,
            },
            Node::Points { points } => Node::Points { points },
            Node::Way { way } => Node::Way { way },
        })
    }
}

/// What gets inserted into and returned from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Point(Point),
    Way(Way),
}

impl Feature {
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Feature::Point(p) => Some(p.rect()),
            Feature::Way(w) => w.bounds(),
        }
    }
}

impl From<Point> for Feature {
    fn from(p: Point) -> Self {
        Feature::Point(p)
    }
}

impl From<Way> for Feature {
    fn from(w: Way) -> Self {
        Feature::Way(w)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Shape of a tree, as tracked by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RTreeStats {
    pub feature_count: u64,
    pub tree_height: u32,
}

/// Page store I/O counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStoreStats {
    pub page_count: u32,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

// ============================================================================
// File Header
// ============================================================================

/// File header stored on page 0 of a page store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub degree: u32,
    pub point_capacity: u32,
    pub root_page: PageId,
    pub root_kind: NodeKind,
    pub height: u32,
    /// Pages in the file, header included
    pub page_count: u32,
    pub feature_count: u64,
    pub bounds: Option<Rect>,
    pub checksum: u32,
}

impl FileHeader {
    pub fn new(degree: usize, point_capacity: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: PAGE_SIZE as u32,
            degree: degree as u32,
            point_capacity: point_capacity as u32,
            root_page: PageId::NONE,
            root_kind: NodeKind::Points,
            height: 0,
            page_count: 1,
            feature_count: 0,
            bounds: None,
            checksum: 0,
        }
    }

    pub fn validate(&self) -> PageTreeResult<()> {
        if self.magic != MAGIC {
            return Err(PageTreeError::InvalidHeader(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(PageTreeError::InvalidHeader(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        if self.page_size as usize != PAGE_SIZE {
            return Err(PageTreeError::InvalidHeader(format!(
                "Unsupported page size {}",
                self.page_size
            )));
        }
        if !(2..=MAX_DEGREE as u32).contains(&self.degree)
            || !(2..=MAX_POINTS as u32).contains(&self.point_capacity)
        {
            return Err(PageTreeError::InvalidHeader(format!(
                "Capacity parameters out of range (degree {}, points {})",
                self.degree, self.point_capacity
            )));
        }
        if self.page_count == 0 {
            return Err(PageTreeError::InvalidHeader("Missing header page".into()));
        }
        if !self.root_page.is_none() {
            if self.root_page.0 == 0 || self.root_page.0 >= self.page_count {
                return Err(PageTreeError::InvalidHeader(format!(
                    "Root {} outside {} pages",
                    self.root_page, self.page_count
                )));
            }
            if self.height == 0 || (self.height == 1) != self.root_kind.is_leaf() {
                return Err(PageTreeError::InvalidHeader(format!(
                    "Height {} inconsistent with {:?} root",
                    self.height, self.root_kind
                )));
            }
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new(MAX_DEGREE, MAX_POINTS)
    }
}
