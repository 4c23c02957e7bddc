//! RTree implementation.

use log::{debug, trace};

use super::node_store::NodeStore;
use super::page_codec::check_way;
use super::search::Search;
use super::split::quadratic_split;
use super::tree_types::{
    Entry, Feature, Node, NodeKind, PageTreeError, PageTreeResult, RTreeStats, Way,
};
use crate::config::TreeConfig;
use crate::geometry::{Point, Rect};

/// An R-tree over points and named ways, stored in any [`NodeStore`].
///
/// Leaves are either point-leaves (up to `point_capacity` bare points) or
/// way-leaves (exactly one way each). All leaves sit at level 0; the root is
/// at level `height - 1`.
pub struct RTree<S: NodeStore> {
    store: S,
    root: S::Ref,
    root_kind: NodeKind,
    height: u32,
    len: u64,
    config: TreeConfig,
}

/// Internal nodes visited on the way down, with the entry index taken at each.
type Path<R> = Vec<(R, usize)>;

/// Bounds of a rewritten node plus the entry for its new sibling, if it split.
type Rewritten<R> = (Rect, Option<Entry<R>>);

impl<S: NodeStore> RTree<S> {
    /// Creates an empty tree whose root is an empty point-leaf.
    pub fn new(mut store: S, config: TreeConfig) -> PageTreeResult<Self> {
        config.validate()?;
        let root = store.allocate(NodeKind::Points)?;
        Ok(Self {
            store,
            root,
            root_kind: NodeKind::Points,
            height: 1,
            len: 0,
            config,
        })
    }

    /// Reattaches a tree to a store that already holds its nodes.
    pub fn from_parts(
        store: S,
        root: S::Ref,
        root_kind: NodeKind,
        height: u32,
        len: u64,
        config: TreeConfig,
    ) -> PageTreeResult<Self> {
        config.validate()?;
        if height == 0 || (height == 1) != root_kind.is_leaf() {
            return Err(PageTreeError::InvalidReference(format!(
                "{:?} root cannot head a tree of height {}",
                root_kind, height
            )));
        }
        Ok(Self {
            store,
            root,
            root_kind,
            height,
            len,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn root(&self) -> S::Ref {
        self.root
    }

    pub fn root_kind(&self) -> NodeKind {
        self.root_kind
    }

    /// Number of levels; a lone leaf root has height 1.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of features inserted.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn stats(&self) -> RTreeStats {
        RTreeStats {
            feature_count: self.len,
            tree_height: self.height,
        }
    }

    /// Bounding rectangle of everything in the tree, `None` when empty.
    pub fn bounds(&self) -> PageTreeResult<Option<Rect>> {
        Ok(self.store.get(self.root, self.root_kind)?.bounds())
    }

    pub fn insert(&mut self, feature: impl Into<Feature>) -> PageTreeResult<()> {
        match feature.into() {
            Feature::Point(p) => self.insert_point(p),
            Feature::Way(w) => self.insert_way(w),
        }
    }

    /// Adds a bare point to the best point-leaf, splitting on overflow.
    pub fn insert_point(&mut self, point: Point) -> PageTreeResult<()> {
        let bbox = point.rect();

        if self.height == 1 {
            if self.root_kind == NodeKind::Points {
                let mut points = self.load_points(self.root)?;
                points.push(point);
                let (rect, overflow) = self.store_points(self.root, points)?;
                if let Some(sibling) = overflow {
                    self.grow_root(rect, sibling)?;
                }
            } else {
                let rect = self.node_bounds(self.root, self.root_kind)?;
                let leaf = self.new_point_leaf(point)?;
                self.grow_root(rect, leaf)?;
            }
        } else {
            let (path, parent) = self.descend_to_leaf_parent(&bbox)?;
            let mut entries = self.load_entries(parent)?;
            match choose_entry(&entries, &bbox, |e| !e.way) {
                Some(idx) => {
                    let leaf = entries[idx].child;
                    let mut points = self.load_points(leaf)?;
                    points.push(point);
                    let (rect, overflow) = self.store_points(leaf, points)?;
                    entries[idx].rect = rect;
                    entries.extend(overflow);
                }
                None => entries.push(self.new_point_leaf(point)?),
            }
            let (rect, overflow) = self.store_entries(parent, entries)?;
            self.adjust_path(&path, rect, overflow)?;
        }

        self.len += 1;
        Ok(())
    }

    /// Adds a way as its own way-leaf.
    ///
    /// Fails with `FeatureTooLarge` when the way cannot fit one page, and
    /// with `InvalidFeature` when it has no points. The tree is left
    /// untouched in both cases.
    pub fn insert_way(&mut self, way: Way) -> PageTreeResult<()> {
        check_way(&way)?;
        let bbox = way.bounds().ok_or_else(|| {
            PageTreeError::InvalidFeature(format!("way {:?} has no points", way.name))
        })?;

        if self.height == 1 {
            let empty_root =
                self.root_kind == NodeKind::Points && self.load_points(self.root)?.is_empty();
            if empty_root {
                self.store.set(self.root, Node::Way { way })?;
                self.root_kind = NodeKind::Way;
            } else {
                let rect = self.node_bounds(self.root, self.root_kind)?;
                let leaf = self.new_way_leaf(bbox, way)?;
                self.grow_root(rect, leaf)?;
            }
        } else {
            let (path, parent) = self.descend_to_leaf_parent(&bbox)?;
            let mut entries = self.load_entries(parent)?;
            entries.push(self.new_way_leaf(bbox, way)?);
            let (rect, overflow) = self.store_entries(parent, entries)?;
            self.adjust_path(&path, rect, overflow)?;
        }

        self.len += 1;
        Ok(())
    }

    /// Lazily yields every feature whose bounding rectangle intersects `query`.
    ///
    /// Pages are fetched one at a time as the iterator is advanced, so
    /// dropping it early skips the rest of the tree.
    pub fn search(&self, query: Rect) -> Search<'_, S> {
        Search::new(&self.store, self.root, self.root_kind, self.height, query)
    }

    /// Every non-empty node's bounding rectangle with its level, root first.
    pub fn collect_rects(&self) -> PageTreeResult<Vec<(u32, Rect)>> {
        let mut rects = Vec::new();
        let mut stack = vec![(self.root, self.root_kind, self.height - 1)];
        while let Some((node, kind, level)) = stack.pop() {
            let node = self.store.get(node, kind)?;
            if let Some(rect) = node.bounds() {
                rects.push((level, rect));
            }
            if let Node::Internal { entries } = node {
                for e in entries.into_iter().rev() {
                    stack.push((e.child, NodeKind::of_child(level - 1, e.way), level - 1));
                }
            }
        }
        Ok(rects)
    }

    // ------------------------------------------------------------------------
    // Descent
    // ------------------------------------------------------------------------

    /// Walks from the root down to the internal node just above the leaves.
    /// Requires `height >= 2`.
    fn descend_to_leaf_parent(&self, bbox: &Rect) -> PageTreeResult<(Path<S::Ref>, S::Ref)> {
        let mut path = Vec::with_capacity(self.height as usize);
        let mut node = self.root;
        let mut level = self.height - 1;
        while level > 1 {
            let entries = self.load_entries(node)?;
            let idx = choose_entry(&entries, bbox, |_| true).ok_or_else(|| {
                PageTreeError::CorruptPage(format!("empty internal node {:?}", node))
            })?;
            path.push((node, idx));
            node = entries[idx].child;
            level -= 1;
        }
        Ok((path, node))
    }

    // ------------------------------------------------------------------------
    // Node rewriting
    // ------------------------------------------------------------------------

    /// Writes `points` back to `leaf`, splitting off a sibling on overflow.
    fn store_points(&mut self, leaf: S::Ref, points: Vec<Point>) -> PageTreeResult<Rewritten<S::Ref>> {
        if points.len() <= self.config.point_capacity() {
            let rect = non_empty(Rect::bounding_points(&points), leaf)?;
            self.store.set(leaf, Node::Points { points })?;
            return Ok((rect, None));
        }

        let rects: Vec<Rect> = points.iter().map(Point::rect).collect();
        let (_, moved) = quadratic_split(&rects, self.config.min_fill(points.len()));
        let (kept, moved) = partition(points, &moved);
        trace!(
            "Splitting point-leaf {:?} into {} + {} points",
            leaf,
            kept.len(),
            moved.len()
        );

        let kept_rect = non_empty(Rect::bounding_points(&kept), leaf)?;
        let moved_rect = non_empty(Rect::bounding_points(&moved), leaf)?;
        let sibling = self.store.allocate(NodeKind::Points)?;
        self.store.set(leaf, Node::Points { points: kept })?;
        self.store.set(sibling, Node::Points { points: moved })?;
        Ok((kept_rect, Some(Entry::new(moved_rect, sibling, false))))
    }

    /// Writes `entries` back to `node`, splitting off a sibling on overflow.
    fn store_entries(
        &mut self,
        node: S::Ref,
        entries: Vec<Entry<S::Ref>>,
    ) -> PageTreeResult<Rewritten<S::Ref>> {
        if entries.len() <= self.config.degree() {
            let rect = non_empty(Rect::bounding(entries.iter().map(|e| e.rect)), node)?;
            self.store.set(node, Node::Internal { entries })?;
            return Ok((rect, None));
        }

        let rects: Vec<Rect> = entries.iter().map(|e| e.rect).collect();
        let (_, moved) = quadratic_split(&rects, self.config.min_fill(entries.len()));
        let (kept, moved) = partition(entries, &moved);
        trace!(
            "Splitting internal node {:?} into {} + {} entries",
            node,
            kept.len(),
            moved.len()
        );

        let kept_rect = non_empty(Rect::bounding(kept.iter().map(|e| e.rect)), node)?;
        let moved_rect = non_empty(Rect::bounding(moved.iter().map(|e| e.rect)), node)?;
        let sibling = self.store.allocate(NodeKind::Internal)?;
        self.store.set(node, Node::Internal { entries: kept })?;
        self.store.set(sibling, Node::Internal { entries: moved })?;
        Ok((kept_rect, Some(Entry::new(moved_rect, sibling, false))))
    }

    /// Refreshes entry rectangles from the bottom of `path` up to the root,
    /// inserting split siblings and splitting ancestors as needed.
    fn adjust_path(
        &mut self,
        path: &[(S::Ref, usize)],
        mut rect: Rect,
        mut overflow: Option<Entry<S::Ref>>,
    ) -> PageTreeResult<()> {
        for &(node, idx) in path.iter().rev() {
            let mut entries = self.load_entries(node)?;
            let entry = entries.get_mut(idx).ok_or_else(|| {
                PageTreeError::CorruptPage(format!("{:?} lost entry {}", node, idx))
            })?;
            if overflow.is_none() && entry.rect == rect {
                return Ok(());
            }
            entry.rect = rect;
            entries.extend(overflow.take());
            (rect, overflow) = self.store_entries(node, entries)?;
        }

        if let Some(sibling) = overflow {
            self.grow_root(rect, sibling)?;
        }
        Ok(())
    }

    /// Replaces the root with a new internal node over the old root and `sibling`.
    fn grow_root(&mut self, root_rect: Rect, sibling: Entry<S::Ref>) -> PageTreeResult<()> {
        let old_root = Entry::new(root_rect, self.root, self.root_kind == NodeKind::Way);
        let root = self.store.allocate(NodeKind::Internal)?;
        self.store.set(
            root,
            Node::Internal {
                entries: vec![old_root, sibling],
            },
        )?;
        self.root = root;
        self.root_kind = NodeKind::Internal;
        self.height += 1;
        debug!("Root split, tree height is now {}", self.height);
        Ok(())
    }

    fn new_point_leaf(&mut self, point: Point) -> PageTreeResult<Entry<S::Ref>> {
        let leaf = self.store.allocate(NodeKind::Points)?;
        self.store.set(
            leaf,
            Node::Points {
                points: vec![point],
            },
        )?;
        Ok(Entry::new(point.rect(), leaf, false))
    }

    fn new_way_leaf(&mut self, bbox: Rect, way: Way) -> PageTreeResult<Entry<S::Ref>> {
        let leaf = self.store.allocate(NodeKind::Way)?;
        self.store.set(leaf, Node::Way { way })?;
        Ok(Entry::new(bbox, leaf, true))
    }

    // ------------------------------------------------------------------------
    // Typed loads
    // ------------------------------------------------------------------------

    pub(crate) fn load_entries(&self, node: S::Ref) -> PageTreeResult<Vec<Entry<S::Ref>>> {
        match self.store.get(node, NodeKind::Internal)? {
            Node::Internal { entries } => Ok(entries),
            other => Err(PageTreeError::KindMismatch {
                expected: NodeKind::Internal,
                found: other.kind(),
            }),
        }
    }

    fn load_points(&self, node: S::Ref) -> PageTreeResult<Vec<Point>> {
        match self.store.get(node, NodeKind::Points)? {
            Node::Points { points } => Ok(points),
            other => Err(PageTreeError::KindMismatch {
                expected: NodeKind::Points,
                found: other.kind(),
            }),
        }
    }

    fn node_bounds(&self, node: S::Ref, kind: NodeKind) -> PageTreeResult<Rect> {
        non_empty(self.store.get(node, kind)?.bounds(), node)
    }
}

/// Index of the eligible entry needing the least area enlargement to cover
/// `bbox`; ties go to the smaller resulting area, then to the lower index.
fn choose_entry<R>(
    entries: &[Entry<R>],
    bbox: &Rect,
    eligible: impl Fn(&Entry<R>) -> bool,
) -> Option<usize> {
    let mut best: Option<(usize, (i128, i128))> = None;
    for (i, entry) in entries.iter().enumerate() {
        if !eligible(entry) {
            continue;
        }
        let grown = entry.rect.union(bbox);
        let cost = (grown.area() - entry.rect.area(), grown.area());
        if best.map_or(true, |(_, best_cost)| cost < best_cost) {
            best = Some((i, cost));
        }
    }
    best.map(|(i, _)| i)
}

/// Splits `items` into those not listed in `moved` and those that are.
fn partition<T>(items: Vec<T>, moved: &[usize]) -> (Vec<T>, Vec<T>) {
    let mut is_moved = vec![false; items.len()];
    for &i in moved {
        is_moved[i] = true;
    }
    let (kept, moved): (Vec<_>, Vec<_>) = items
        .into_iter()
        .enumerate()
        .partition(|(i, _)| !is_moved[*i]);
    (
        kept.into_iter().map(|(_, item)| item).collect(),
        moved.into_iter().map(|(_, item)| item).collect(),
    )
}

fn non_empty<R: std::fmt::Debug>(rect: Option<Rect>, node: R) -> PageTreeResult<Rect> {
    rect.ok_or_else(|| PageTreeError::CorruptPage(format!("node {:?} is unexpectedly empty", node)))
}
