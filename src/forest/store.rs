//! Append-only arena holding one parsed document.
//!
//! The store keeps every node of a document (elements, text runs,
//! attributes), their first-child/next-sibling links, rollup hashes and
//! the mutable match annotations written by the diff engine. Nodes are
//! addressed by sequential [`NodeId`] handles; the arena grows as nodes
//! are appended and is never structurally mutated afterwards.

use std::collections::HashMap;

use super::node::{MatchState, Node, NodeId, NodeKind, TagId};

/// Arena forest for one parsed XML document.
#[derive(Debug, Default)]
pub struct ForestStore {
    nodes: Vec<Node>,
    /// Interned tag names, indexed by `TagId`.
    tags: Vec<String>,
    tag_ids: HashMap<String, TagId>,
    /// Per text node: flat list of byte offsets into the text value,
    /// paired as (start, end) of CDATA sections.
    cdata: HashMap<NodeId, Vec<usize>>,
}

impl ForestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes appended so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The document root. Valid once the first element was appended.
    pub fn root(&self) -> NodeId {
        debug_assert!(!self.nodes.is_empty(), "root() on an empty forest");
        NodeId(0)
    }

    fn intern_tag(&mut self, tag: &str) -> TagId {
        if let Some(&id) = self.tag_ids.get(tag) {
            return id;
        }
        let id = TagId(self.tags.len() as u32);
        self.tags.push(tag.to_string());
        self.tag_ids.insert(tag.to_string(), id);
        id
    }

    /// Append a node and wire it into its parent's child chain, either
    /// as the first child or after `left_sibling`.
    fn append(
        &mut self,
        mut node: Node,
        parent: Option<NodeId>,
        left_sibling: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        node.parent = parent;
        self.nodes.push(node);

        if let Some(pid) = parent {
            match left_sibling {
                Some(lsid) => self.nodes[lsid.index()].next_sibling = Some(id),
                None => self.nodes[pid.index()].first_child = Some(id),
            }
            self.nodes[pid.index()].children_count += 1;

            // Bubble subtree sizes up the ancestor chain; the walk is
            // bounded by document depth.
            let mut ancestor = Some(pid);
            while let Some(aid) = ancestor {
                self.nodes[aid.index()].descendant_count += 1;
                ancestor = self.nodes[aid.index()].parent;
            }
        }
        id
    }

    /// Add an element under `parent`, after `left_sibling` (or as the
    /// first child when `left_sibling` is `None`). A `None` parent
    /// creates the root.
    pub fn add_element(
        &mut self,
        parent: Option<NodeId>,
        left_sibling: Option<NodeId>,
        tag: &str,
    ) -> NodeId {
        let tag = self.intern_tag(tag);
        self.append(
            Node::new(NodeKind::Element { tag }, parent),
            parent,
            left_sibling,
        )
    }

    /// Add a text node with its content hash.
    pub fn add_text(
        &mut self,
        parent: NodeId,
        left_sibling: Option<NodeId>,
        text: String,
        hash: u64,
    ) -> NodeId {
        let mut node = Node::new(NodeKind::Text { value: text }, Some(parent));
        node.hash = hash;
        self.append(node, Some(parent), left_sibling)
    }

    /// Add an attribute on `owner`: internally a name-element carrying
    /// `attr_hash` plus a value-text child carrying `value_hash`, wired
    /// into the child chain before any content nodes.
    pub fn add_attribute(
        &mut self,
        owner: NodeId,
        left_sibling: Option<NodeId>,
        name: &str,
        value: &str,
        value_hash: u64,
        attr_hash: u64,
    ) -> NodeId {
        let aid = self.add_element(Some(owner), left_sibling, name);
        self.add_text(aid, None, value.to_string(), value_hash);
        let node = &mut self.nodes[aid.index()];
        node.is_attribute = true;
        node.hash = attr_hash;
        aid
    }

    /// Set the rollup hash of an element once its subtree is complete.
    pub fn set_hash(&mut self, id: NodeId, hash: u64) {
        self.nodes[id.index()].hash = hash;
    }

    /// Record a CDATA section boundary (byte offset into the text
    /// value). Boundaries arrive in start/end pairs.
    pub fn add_cdata_span(&mut self, text_id: NodeId, offset: usize) {
        self.cdata.entry(text_id).or_default().push(offset);
    }

    /// CDATA boundaries recorded for a text node, start/end interleaved.
    pub fn cdata_spans(&self, text_id: NodeId) -> &[usize] {
        self.cdata.get(&text_id).map_or(&[], Vec::as_slice)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// First content child, skipping attribute nodes.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        let mut cid = self.node(id).first_child;
        while let Some(c) = cid {
            if !self.node(c).is_attribute {
                return Some(c);
            }
            cid = self.node(c).next_sibling;
        }
        None
    }

    /// Next content sibling (attributes never follow content nodes in
    /// the chain, so no skipping is needed here).
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// First attribute node, if any. Attributes sit at the front of the
    /// child chain.
    pub fn first_attribute(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).first_child {
            Some(c) if self.node(c).is_attribute => Some(c),
            _ => None,
        }
    }

    /// Next attribute after `aid`, stopping at the first content node.
    pub fn next_attribute(&self, aid: NodeId) -> Option<NodeId> {
        match self.node(aid).next_sibling {
            Some(c) if self.node(c).is_attribute => Some(c),
            _ => None,
        }
    }

    /// Attribute nodes of an element, in document order.
    pub fn attributes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut aid = self.first_attribute(id);
        while let Some(a) = aid {
            out.push(a);
            aid = self.next_attribute(a);
        }
        out
    }

    /// Content children (text and elements, no attributes), in order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cid = self.first_child(id);
        while let Some(c) = cid {
            out.push(c);
            cid = self.next_sibling(c);
        }
        out
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text { .. })
    }

    pub fn is_attribute(&self, id: NodeId) -> bool {
        self.node(id).is_attribute
    }

    /// Interned tag id of an element node.
    pub fn tag(&self, id: NodeId) -> TagId {
        match self.node(id).kind {
            NodeKind::Element { tag } => tag,
            NodeKind::Text { .. } => panic!("tag() on text node {id}"),
        }
    }

    /// Tag name of an element node (attribute name for attribute nodes).
    pub fn tag_name(&self, id: NodeId) -> &str {
        &self.tags[self.tag(id).0 as usize]
    }

    /// Literal content of a text node.
    pub fn text(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Text { value } => value,
            NodeKind::Element { .. } => panic!("text() on element node {id}"),
        }
    }

    /// The single text child holding an attribute's value.
    pub fn attribute_value_node(&self, aid: NodeId) -> NodeId {
        debug_assert!(self.node(aid).is_attribute);
        self.node(aid)
            .first_child
            .expect("attribute without value child")
    }

    /// Value of an attribute node (its single text child).
    pub fn attribute_value(&self, aid: NodeId) -> &str {
        self.text(self.attribute_value_node(aid))
    }

    pub fn hash(&self, id: NodeId) -> u64 {
        self.node(id).hash
    }

    pub fn children_count(&self, id: NodeId) -> u32 {
        self.node(id).children_count
    }

    /// Cached descendant count (excluding the node itself). The
    /// delete/insert sentinel cost of a subtree is this plus one.
    pub fn descendant_count(&self, id: NodeId) -> u32 {
        self.node(id).descendant_count
    }

    // ------------------------------------------------------------------
    // Match annotations
    // ------------------------------------------------------------------

    /// Record a match outcome. Each node receives exactly one write per
    /// diff run; a second write is a traversal defect.
    pub fn set_matching(&mut self, id: NodeId, state: MatchState) {
        let node = &mut self.nodes[id.index()];
        debug_assert!(
            node.matching == MatchState::Unset,
            "match annotation written twice for node {id}: {:?} then {state:?}",
            node.matching,
        );
        node.matching = state;
    }

    pub fn matching(&self, id: NodeId) -> MatchState {
        self.node(id).matching
    }
}
