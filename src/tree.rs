use std::collections::HashMap;

use crate::record::{ContentHash, SearchRecord};

/// Stable handle into the result arena. Handles are never invalidated by
/// insertions or resorts; they only die with the arena on `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
pub struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    record: Option<SearchRecord>,
    expanded: bool,
}

impl Node {
    fn root() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            record: None,
            expanded: true,
        }
    }

    fn leaf(record: SearchRecord) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            record: Some(record),
            expanded: false,
        }
    }
}

/// Hierarchical result container: the root holds one child per distinct
/// result, and a top-level file node collects further results sharing its
/// content hash as children (the node itself acts as the group
/// representative). Nodes live in an arena indexed by `NodeId`; detached
/// nodes stay allocated until the next `clear`.
pub struct ResultTree {
    nodes: Vec<Node>,
    index: HashMap<ContentHash, NodeId>,
}

impl Default for ResultTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
            index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id.0 == 0
    }

    /// Drop every node and index entry. Outstanding `NodeId`s become
    /// meaningless and must not be reused by callers.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::root());
        self.index.clear();
    }

    pub fn alloc(&mut self, record: SearchRecord) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::leaf(record));
        id
    }

    pub fn record(&self, id: NodeId) -> Option<&SearchRecord> {
        self.nodes[id.0].record.as_ref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.nodes[id.0].children.len()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.nodes[id.0].children.is_empty()
    }

    pub fn child_at(&self, id: NodeId, row: usize) -> Option<NodeId> {
        self.nodes[id.0].children.get(row).copied()
    }

    /// Position of `id` among its parent's children; 0 for the root.
    pub fn row_of(&self, id: NodeId) -> usize {
        match self.nodes[id.0].parent {
            Some(parent) => {
                let row = self.nodes[parent.0]
                    .children
                    .iter()
                    .position(|child| *child == id);
                debug_assert!(row.is_some(), "child not listed by its parent");
                row.unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Group-level display weight: the number of aggregated results.
    pub fn hit_count(&self, id: NodeId) -> usize {
        self.nodes[id.0].children.len() + 1
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.nodes[id.0].expanded
    }

    pub fn set_expanded(&mut self, id: NodeId, state: bool) {
        self.nodes[id.0].expanded = state;
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.0].parent.is_none());
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, row: usize) -> bool {
        if row > self.nodes[parent.0].children.len() {
            return false;
        }
        debug_assert!(self.nodes[child.0].parent.is_none());
        self.nodes[parent.0].children.insert(row, child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Detach the child at `row`. The node and its subtree stay in the
    /// arena but are no longer reachable from the root.
    pub fn take_child(&mut self, parent: NodeId, row: usize) -> Option<NodeId> {
        if row >= self.nodes[parent.0].children.len() {
            return None;
        }
        let child = self.nodes[parent.0].children.remove(row);
        self.nodes[child.0].parent = None;
        Some(child)
    }

    pub fn move_child(&mut self, parent: NodeId, from: usize, to: usize) -> bool {
        let children = &mut self.nodes[parent.0].children;
        if from >= children.len() || to >= children.len() {
            return false;
        }
        let child = children.remove(from);
        children.insert(to, child);
        true
    }

    /// Atomic child-list swap used by the bulk resort. The new order must
    /// be a permutation of the old one.
    pub fn set_children(&mut self, parent: NodeId, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.nodes[parent.0].children.len());
        self.nodes[parent.0].children = order;
    }

    /// Representative swap: the group's displayed record trades places
    /// with the newcomer's so the group row always shows the
    /// best-available source.
    pub fn swap_records(&mut self, a: NodeId, b: NodeId) {
        debug_assert!(a != b);
        let (low, high) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (head, tail) = self.nodes.split_at_mut(high);
        std::mem::swap(&mut head[low].record, &mut tail[0].record);
    }

    pub fn index_insert(&mut self, hash: ContentHash, id: NodeId) {
        self.index.insert(hash, id);
    }

    pub fn index_lookup(&self, hash: &ContentHash) -> Option<NodeId> {
        self.index.get(hash).copied()
    }

    pub fn index_remove(&mut self, hash: &ContentHash) {
        self.index.remove(hash);
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Duplicate check across a group: the representative record and every
    /// child are compared against the incoming record. Identity is the
    /// (path, user) pair; strict mode additionally requires the source
    /// network address to match.
    pub fn group_contains(&self, group: NodeId, record: &SearchRecord, strict: bool) -> bool {
        if let Some(own) = self.record(group) {
            if records_equal(own, record, strict) {
                return true;
            }
        }
        self.nodes[group.0].children.iter().any(|child| {
            self.record(*child)
                .is_some_and(|existing| records_equal(existing, record, strict))
        })
    }
}

fn records_equal(a: &SearchRecord, b: &SearchRecord, strict: bool) -> bool {
    a.path == b.path && a.user == b.user && (!strict || a.address == b.address)
}
