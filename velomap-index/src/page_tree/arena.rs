//! In-memory node pool used while building an index.
//!
//! Nodes are addressed by [`ArenaIndex`] and only ever appended, so an index
//! handed out stays valid for the arena's lifetime. Flush walks the pool in
//! allocation order to assign page ids.

use super::node_store::NodeStore;
use super::tree_types::{ArenaIndex, Node, NodeKind, PageTreeError, PageTreeResult};

/// Growable pool of nodes addressed by index.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node<ArenaIndex>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
        }
    }

    /// Borrowed view of a node.
    pub fn node(&self, index: ArenaIndex) -> PageTreeResult<&Node<ArenaIndex>> {
        self.nodes.get(index.0).ok_or_else(|| self.out_of_range(index))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &Node<ArenaIndex>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ArenaIndex(i), node))
    }

    fn out_of_range(&self, index: ArenaIndex) -> PageTreeError {
        PageTreeError::InvalidReference(format!(
            "{} outside arena of {} nodes",
            index,
            self.nodes.len()
        ))
    }
}

impl NodeStore for NodeArena {
    type Ref = ArenaIndex;

    fn get(&self, node: ArenaIndex, kind: NodeKind) -> PageTreeResult<Node<ArenaIndex>> {
        let found = self.node(node)?;
        if found.kind() != kind {
            return Err(PageTreeError::KindMismatch {
                expected: kind,
                found: found.kind(),
            });
        }
        Ok(found.clone())
    }

    fn set(&mut self, node: ArenaIndex, value: Node<ArenaIndex>) -> PageTreeResult<()> {
        let err = self.out_of_range(node);
        let slot = self.nodes.get_mut(node.0).ok_or(err)?;
        *slot = value;
        Ok(())
    }

    fn allocate(&mut self, kind: NodeKind) -> PageTreeResult<ArenaIndex> {
        self.nodes.push(Node::empty(kind));
        Ok(ArenaIndex(self.nodes.len() - 1))
    }
}
