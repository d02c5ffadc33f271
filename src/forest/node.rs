//! Node records stored in a [`ForestStore`](super::ForestStore) arena.

use std::fmt;

/// Forest-local node handle.
///
/// Ids are sequential within one forest and are only meaningful together
/// with the forest they were issued by; cross-forest code must carry the
/// owning forest explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena index of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "node id space exhausted");
        Self(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interned tag name handle, scoped to one forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(pub(crate) u32);

/// What a node holds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// An element (or an attribute's name node, see `Node::is_attribute`).
    Element { tag: TagId },
    /// A text run.
    Text { value: String },
}

/// Match outcome recorded on a node by the diff engine.
///
/// `Unset` means "never touched by the matcher", which the writer reads
/// as unchanged: the degenerate fast path annotates nothing when the
/// root hashes already agree. Once set, an annotation is never
/// overwritten during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchState {
    /// Untouched; rendered as an unchanged subtree.
    #[default]
    Unset,
    /// No counterpart: a delete on this forest's side, an insert seen
    /// from the other side.
    NoMatch,
    /// Paired with the given node of the other forest.
    Changed(NodeId),
}

/// One arena record.
#[derive(Debug)]
pub(crate) struct Node {
    pub kind: NodeKind,
    /// Attribute nodes are element-kind nodes holding the attribute
    /// name, with a single text child holding the value.
    pub is_attribute: bool,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub children_count: u32,
    /// Number of descendants, excluding the node itself. Maintained
    /// incrementally on every append; delete/insert sentinel cost is
    /// `descendant_count + 1`.
    pub descendant_count: u32,
    /// Rollup hash of the subtree content (order-independent for
    /// elements, content hash for text nodes, combined name/value hash
    /// for attributes).
    pub hash: u64,
    pub matching: MatchState,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            is_attribute: false,
            parent,
            first_child: None,
            next_sibling: None,
            children_count: 0,
            descendant_count: 0,
            hash: 0,
            matching: MatchState::Unset,
        }
    }
}
