//! Structural integrity checking.
//!
//! Walks the whole tree from the root and reports every broken invariant it
//! finds instead of stopping at the first one.

use log::warn;

use super::node_store::NodeStore;
use super::page_codec::check_way;
use super::tree_impl::RTree;
use super::tree_types::{Node, NodeKind, PageTreeError, PageTreeResult};
use crate::geometry::Rect;

// ============================================================================
// Integrity Checking
// ============================================================================

/// Result of integrity check operation
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes visited
    pub nodes_checked: u64,
    /// Features found in leaves
    pub features: u64,
    /// Nodes that could not be decoded, by debug name
    pub corrupted_nodes: Vec<String>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            features: 0,
            corrupted_nodes: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NodeStore> RTree<S> {
    /// Checks bounding, capacity, balance and the feature count.
    ///
    /// Decode failures and kind mismatches are recorded in the report; only
    /// device-level errors are returned as `Err`.
    pub fn check_integrity(&self) -> PageTreeResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        self.check_node(self.root(), self.root_kind(), self.height() - 1, None, &mut report)?;

        if report.features != self.len() {
            report.fail(format!(
                "Tree records {} features but leaves hold {}",
                self.len(),
                report.features
            ));
        }
        if !report.is_valid {
            warn!("Integrity check found {} problems", report.errors.len());
        }
        Ok(report)
    }

    fn check_node(
        &self,
        node: S::Ref,
        kind: NodeKind,
        level: u32,
        entry_rect: Option<Rect>,
        report: &mut IntegrityReport,
    ) -> PageTreeResult<()> {
        let loaded = match self.store().get(node, kind) {
            Ok(loaded) => loaded,
            Err(PageTreeError::CorruptPage(msg)) => {
                report.corrupted_nodes.push(format!("{:?}", node));
                report.fail(format!("{:?} is corrupt: {}", node, msg));
                return Ok(());
            }
            Err(e @ PageTreeError::KindMismatch { .. }) => {
                report.fail(format!("{:?} at level {}: {}", node, level, e));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        report.nodes_checked += 1;

        let is_root = entry_rect.is_none();
        if !is_root && loaded.is_empty() {
            report.fail(format!("{:?} at level {} is empty", node, level));
        }
        if let Some(expected) = entry_rect {
            if loaded.bounds() != Some(expected) {
                report.fail(format!(
                    "{:?} bounds {:?} differ from parent entry {}",
                    node,
                    loaded.bounds(),
                    expected
                ));
            }
        }

        match loaded {
            Node::Internal { entries } => {
                if entries.len() > self.config().degree() {
                    report.fail(format!(
                        "{:?} holds {} entries, degree is {}",
                        node,
                        entries.len(),
                        self.config().degree()
                    ));
                }
                if is_root && entries.is_empty() {
                    report.fail(format!("Internal root {:?} is empty", node));
                }
                for entry in entries {
                    if entry.way && level > 1 {
                        report.fail(format!(
                            "{:?} marks way child {:?} above leaf level",
                            node, entry.child
                        ));
                        continue;
                    }
                    let child_kind = NodeKind::of_child(level - 1, entry.way);
                    self.check_node(entry.child, child_kind, level - 1, Some(entry.rect), report)?;
                }
            }
            Node::Points { points } => {
                if points.len() > self.config().point_capacity() {
                    report.fail(format!(
                        "{:?} holds {} points, capacity is {}",
                        node,
                        points.len(),
                        self.config().point_capacity()
                    ));
                }
                report.features += points.len() as u64;
            }
            Node::Way { way } => {
                if let Err(e) = check_way(&way) {
                    report.fail(format!("{:?}: {}", node, e));
                }
                if way.points.is_empty() {
                    report.fail(format!("Way in {:?} has no points", node));
                }
                report.features += 1;
            }
        }
        Ok(())
    }
}
