//! NodeStore trait definition.

use std::fmt::Debug;
use std::hash::Hash;

use super::tree_types::{Node, NodeKind, PageTreeResult};

/// Backing storage the tree engine reads and writes nodes through.
///
/// Implemented by the in-memory build arena and by the on-disk page store,
/// so insert, split and search run unchanged against either one.
///
/// Nodes carry no stored type tag, so callers pass the kind they expect from
/// tree context; a store that does track kinds reports a disagreement as
/// `KindMismatch`.
pub trait NodeStore {
    /// How this store names a node.
    type Ref: Copy + Eq + Hash + Debug;

    /// Loads the node at `node`, decoded as `kind`.
    fn get(&self, node: Self::Ref, kind: NodeKind) -> PageTreeResult<Node<Self::Ref>>;

    /// Replaces the node at `node`.
    fn set(&mut self, node: Self::Ref, value: Node<Self::Ref>) -> PageTreeResult<()>;

    /// Creates a new empty node of `kind` and returns its reference.
    fn allocate(&mut self, kind: NodeKind) -> PageTreeResult<Self::Ref>;
}
