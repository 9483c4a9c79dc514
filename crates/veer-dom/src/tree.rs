//! DOM Tree (arena-based allocation)
//!
//! Detached nodes stay in the arena until [`DomTree::collect_garbage`]
//! runs, so a [`NodeId`] can be reinserted later. That is how permanent
//! elements survive a page render. Collection frees every unreachable slot
//! for reuse and bumps its generation, which lets holders of an id notice
//! that it now names a different node.

use crate::{ElementData, Node, NodeData, NodeId, Selector};

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Option<Node>>,
    generations: Vec<u32>,
    free: Vec<NodeId>,
}

impl DomTree {
    /// Create a tree whose root is a document node
    pub fn new() -> Self {
        Self::with_root(NodeData::Document)
    }

    /// Create a tree whose root is a fragment node
    pub fn new_fragment() -> Self {
        Self::with_root(NodeData::Fragment)
    }

    fn with_root(data: NodeData) -> Self {
        Self { nodes: vec![Some(Node::with_data(data))], generations: vec![0], free: Vec::new() }
    }

    /// Root node
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Number of live nodes in the arena (attached or not)
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How often the slot of `id` has been freed
    pub fn generation(&self, id: NodeId) -> u32 {
        self.generations.get(id.index()).copied().unwrap_or(0)
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let node = Some(Node::with_data(data));
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.generations.push(0);
        id
    }

    /// Free every node that can no longer be reached from the root.
    /// Returns how many were freed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut reachable = vec![false; self.nodes.len()];
        reachable[self.root().index()] = true;
        for id in self.descendants(self.root()) {
            reachable[id.index()] = true;
        }
        let mut freed = 0;
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if reachable[index] || slot.take().is_none() {
                continue;
            }
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.free.push(NodeId(index as u32));
            freed += 1;
        }
        if freed > 0 {
            tracing::trace!(freed, live = self.len(), "collected detached nodes");
        }
        freed
    }

    /// A copy holding only the nodes reachable from the root
    pub fn compacted(&self) -> DomTree {
        let data = self.get(self.root()).map_or(NodeData::Document, |n| n.data.clone());
        let mut tree = Self::with_root(data);
        let root = tree.root();
        for child in self.children(self.root()) {
            let copy = tree.import(self, child);
            tree.append_child(root, copy);
        }
        tree
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData::new(tag)))
    }

    /// Create an element with attributes in one go
    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut data = ElementData::new(tag);
        for (name, value) in attrs {
            data.set_attr(name, value);
        }
        self.push(NodeData::Element(data))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeData::Fragment)
    }

    pub fn create_doctype(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Doctype { name: name.to_string() })
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent.to_option())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.first_child.to_option())
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.last_child.to_option())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.next_sibling.to_option())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.prev_sibling.to_option())
    }

    /// Iterate over direct children
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first_child(id), move |&c| self.next_sibling(c))
    }

    /// Direct children collected, safe to use while mutating
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).collect()
    }

    /// Direct element children
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).filter(|&c| self.is_element(c)).collect()
    }

    /// All descendants in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_ids(id);
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut kids = self.child_ids(next);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// True if `node` is `ancestor` or lives below it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// True if the node is reachable from the root
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.root(), id)
    }

    /// Position among siblings
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).position(|c| c == id)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Detach a node from its parent. The node and its subtree stay in the
    /// arena and can be inserted again.
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);
        if !parent.is_valid() {
            return;
        }

        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }
        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Append `child` as the last child of `parent`, moving it if attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` before `reference` (or append when `None`).
    ///
    /// Fragments are unpacked: their children are inserted in order and the
    /// fragment is left empty. Inserting a node into its own subtree is
    /// refused.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.get(parent).is_none() || self.get(child).is_none() || child == parent {
            return;
        }
        if self.contains(child, parent) {
            tracing::warn!("refusing to insert {} into its own subtree", child);
            return;
        }
        if matches!(self.get(child).map(|n| &n.data), Some(NodeData::Fragment)) {
            for grandchild in self.child_ids(child) {
                self.insert_before(parent, grandchild, reference);
            }
            return;
        }
        if reference == Some(child) {
            return;
        }
        let reference = reference.filter(|&r| self.parent(r) == Some(parent));

        self.detach(child);

        let (prev, next) = match reference {
            Some(r) => (NodeId::from_option(self.prev_sibling(r)), r),
            None => (NodeId::from_option(self.last_child(parent)), NodeId::NONE),
        };

        if let Some(node) = self.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = child;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = child;
        }
        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = child;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = child;
        }
    }

    /// Insert `node` right after `reference` under the same parent
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        if let Some(parent) = self.parent(reference) {
            let next = self.next_sibling(reference);
            self.insert_before(parent, node, next);
        }
    }

    /// Put `replacement` where `old` is and detach `old`
    pub fn replace_node(&mut self, old: NodeId, replacement: NodeId) {
        if old == replacement {
            return;
        }
        if let Some(parent) = self.parent(old) {
            self.insert_before(parent, replacement, Some(old));
            self.detach(old);
        }
    }

    /// Detach every child of `id`
    pub fn remove_children(&mut self, id: NodeId) {
        for child in self.child_ids(id) {
            self.detach(child);
        }
    }

    // ------------------------------------------------------------------
    // Element data
    // ------------------------------------------------------------------

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(Node::is_element)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(Node::as_element_mut)
    }

    /// Lowercase tag name of an element
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn has_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.get_attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_attr(name))
    }

    /// Set an attribute; returns true when something changed
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        self.element_mut(id).is_some_and(|e| e.set_attr(name, value))
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id).and_then(|e| e.remove_attr(name))
    }

    /// Non-empty `id` attribute
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(ElementData::id)
    }

    /// Character data of a text or comment node
    pub fn char_data(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Text(t) | NodeData::Comment(t) => Some(t),
            _ => None,
        }
    }

    /// Replace character data of a text or comment node
    pub fn set_char_data(&mut self, id: NodeId, text: &str) -> bool {
        match self.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Text(t)) | Some(NodeData::Comment(t)) if t.as_str() != text => {
                *t = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(NodeData::Text(t)) = self.get(id).map(|n| &n.data) {
            return t.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.get(d).and_then(Node::as_text))
            .collect()
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        self.remove_children(id);
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// First element under `root` (inclusive) with the given id
    pub fn get_element_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        if self.element_id(root) == Some(id) {
            return Some(root);
        }
        self.descendants(root)
            .into_iter()
            .find(|&n| self.element_id(n) == Some(id))
    }

    /// All elements under `root` (exclusive) that satisfy `pred`
    pub fn find_all(&self, root: NodeId, pred: impl Fn(&ElementData) -> bool) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.element(n).is_some_and(&pred))
            .collect()
    }

    /// First element under `root` (exclusive) that satisfies `pred`
    pub fn find_first(&self, root: NodeId, pred: impl Fn(&ElementData) -> bool) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|&n| self.element(n).is_some_and(&pred))
    }

    /// Elements under `root` matching a selector
    pub fn query_selector_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| selector.matches(self, n))
            .collect()
    }

    pub fn query_selector(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|&n| selector.matches(self, n))
    }

    /// Nearest inclusive ancestor element satisfying `pred`
    pub fn closest(&self, id: NodeId, pred: impl Fn(&ElementData) -> bool) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.element(n).is_some_and(&pred))
    }

    // ------------------------------------------------------------------
    // Copying
    // ------------------------------------------------------------------

    /// Deep-copy a subtree from another tree into this one. The copy is
    /// detached; a fragment source yields a fragment.
    pub fn import(&mut self, source: &DomTree, source_id: NodeId) -> NodeId {
        let data = match source.get(source_id) {
            Some(node) => match &node.data {
                NodeData::Document => NodeData::Fragment,
                other => other.clone(),
            },
            None => return self.create_fragment(),
        };
        let copy = self.push(data);
        for child in source.child_ids(source_id) {
            let child_copy = self.import(source, child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Copy the children of `source_id` into a new detached fragment
    pub fn import_children(&mut self, source: &DomTree, source_id: NodeId) -> NodeId {
        let fragment = self.create_fragment();
        for child in source.child_ids(source_id) {
            let copy = self.import(source, child);
            self.append_child(fragment, copy);
        }
        fragment
    }

    /// Clone a node within this tree
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        let data = match self.get(id) {
            Some(node) => node.data.clone(),
            None => return self.create_fragment(),
        };
        let copy = self.push(data);
        if deep {
            for child in self.child_ids(id) {
                let child_copy = self.clone_node(child, true);
                self.append_child(copy, child_copy);
            }
        }
        copy
    }

    /// Estimated memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Option<Node>>()
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}
