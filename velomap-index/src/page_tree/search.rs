//! Lazy window query.

use std::collections::VecDeque;

use log::warn;

use super::node_store::NodeStore;
use super::tree_types::{Feature, Node, NodeKind, PageTreeError, PageTreeResult};
use crate::geometry::Rect;

/// Iterator over the features whose bounding rectangle intersects a window.
///
/// Traversal is depth-first in entry order. Nothing is loaded until the
/// iterator is advanced and only one node is loaded per step. A node that
/// fails to load or decode is yielded as an `Err` and its subtree is skipped;
/// the remaining branches are still visited.
pub struct Search<'a, S: NodeStore> {
    store: &'a S,
    query: Rect,
    stack: Vec<(S::Ref, NodeKind, u32)>,
    pending: VecDeque<Feature>,
}

impl<'a, S: NodeStore> Search<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        root: S::Ref,
        root_kind: NodeKind,
        height: u32,
        query: Rect,
    ) -> Self {
        Self {
            store,
            query,
            stack: vec![(root, root_kind, height.saturating_sub(1))],
            pending: VecDeque::new(),
        }
    }

    pub fn query(&self) -> Rect {
        self.query
    }

    fn visit(&mut self, node: S::Ref, kind: NodeKind, level: u32) -> PageTreeResult<()> {
        match self.store.get(node, kind)? {
            Node::Internal { entries } => {
                if level == 0 {
                    return Err(PageTreeError::CorruptPage(format!(
                        "internal node {:?} at leaf level",
                        node
                    )));
                }
                if let Some(bad) = entries.iter().find(|e| e.way && level > 1) {
                    return Err(PageTreeError::CorruptPage(format!(
                        "way child {:?} of {:?} above leaf level",
                        bad.child, node
                    )));
                }
                let query = self.query;
                self.stack.extend(
                    entries
                        .into_iter()
                        .rev()
                        .filter(|e| e.rect.intersects(&query))
                        .map(|e| (e.child, NodeKind::of_child(level - 1, e.way), level - 1)),
                );
            }
            Node::Points { points } => {
                let query = self.query;
                self.pending.extend(
                    points
                        .into_iter()
                        .filter(|p| query.contains_point(p))
                        .map(Feature::Point),
                );
            }
            Node::Way { way } => {
                if way.bounds().is_some_and(|b| b.intersects(&self.query)) {
                    self.pending.push_back(Feature::Way(way));
                }
            }
        }
        Ok(())
    }
}

impl<S: NodeStore> Iterator for Search<'_, S> {
    type Item = PageTreeResult<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                return Some(Ok(feature));
            }
            let (node, kind, level) = self.stack.pop()?;
            if let Err(e) = self.visit(node, kind, level) {
                warn!("Search over {} skipped {:?}: {}", self.query, node, e);
                return Some(Err(e));
            }
        }
    }
}
