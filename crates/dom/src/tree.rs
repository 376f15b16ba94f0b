//! Tree construction, navigation and mutation.

use crate::host::HostState;
use crate::{Document, DomNode, NodeKind};
use anyhow::{Result, anyhow};
use indextree::{Arena, Node, NodeId};
use log::trace;

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty `html > (head, body)` document.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        let html = arena.new_node(DomNode::element("html"));
        let head = arena.new_node(DomNode::element("head"));
        let body = arena.new_node(DomNode::element("body"));
        root.append(html, &mut arena);
        html.append(head, &mut arena);
        html.append(body, &mut arena);
        Self {
            arena,
            root,
            title: String::new(),
            host: HostState::default(),
        }
    }

    /// The document node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, node: NodeId) -> Option<&DomNode> {
        self.arena.get(node).map(Node::get)
    }

    #[inline]
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut DomNode> {
        self.arena.get_mut(node).map(Node::get_mut)
    }

    /// Whether `node` still resolves. Ids into a reclaimed subtree do not.
    #[inline]
    pub fn is_live(&self, node: NodeId) -> bool {
        self.arena.get(node).is_some_and(|entry| !entry.is_removed())
    }

    /// Nodes currently allocated, connected or not.
    #[inline]
    pub fn live_nodes(&self) -> usize {
        self.arena.live_count()
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.node(node).map(|data| &data.kind)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(DomNode::is_element)
    }

    /// Lowercase tag name, or `None` for non-elements.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.node(node).and_then(DomNode::tag)
    }

    // -----------------------
    // Attributes
    // -----------------------

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.node(node)?
            .attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Set or replace an attribute. Non-elements are ignored.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(data) = self.node_mut(node) else {
            return;
        };
        if !data.is_element() {
            return;
        }
        if let Some(slot) = data
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            value.clone_into(&mut slot.1);
        } else {
            data.attrs.push((name.to_ascii_lowercase(), value.to_owned()));
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        let data = self.node_mut(node)?;
        let index = data
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(data.attrs.remove(index).1)
    }

    pub fn id_of(&self, node: NodeId) -> Option<&str> {
        self.attribute(node, "id").filter(|id| !id.is_empty())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|list| list.split_ascii_whitespace().any(|token| token == class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if class.is_empty() || !self.is_element(node) || self.has_class(node, class) {
            return;
        }
        let updated = match self.attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_owned(),
        };
        self.set_attribute(node, "class", &updated);
    }

    /// Remove a class token; an emptied `class` attribute is dropped.
    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attribute(node, "class") else {
            return;
        };
        let kept: Vec<&str> = existing
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect();
        if kept.is_empty() {
            let _removed = self.remove_attribute(node, "class");
        } else {
            let joined = kept.join(" ");
            self.set_attribute(node, "class", &joined);
        }
    }

    // -----------------------
    // Navigation
    // -----------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent()
    }

    /// Parent if it is an element (document and fragment roots are not).
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.children(&self.arena).collect()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        let mut children = self.children(node);
        children.retain(|child| self.is_element(*child));
        children
    }

    pub fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        if !self.is_live(node) {
            return None;
        }
        node.following_siblings(&self.arena)
            .skip(1)
            .find(|sibling| self.is_element(*sibling))
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        if !self.is_live(node) {
            return None;
        }
        node.preceding_siblings(&self.arena)
            .skip(1)
            .find(|sibling| self.is_element(*sibling))
    }

    /// Ancestors excluding the node itself, nearest first.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.ancestors(&self.arena).skip(1).collect()
    }

    /// Descendants excluding the node itself, in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.descendants(&self.arena).skip(1).collect()
    }

    /// Whether `node` is attached below the document node.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Inclusive containment check.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.is_live(node) && node.ancestors(&self.arena).any(|id| id == ancestor)
    }

    /// The `html` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.root.children(&self.arena).find(|child| self.is_element(*child))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.html_child("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.html_child("body")
    }

    fn html_child(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        html.children(&self.arena)
            .find(|child| self.tag_name(*child) == Some(tag))
    }

    // -----------------------
    // Mutation
    // -----------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.arena.new_node(DomNode::element(tag))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DomNode::text(text))
    }

    /// Create a detached fragment container.
    pub fn create_fragment(&mut self) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Fragment,
            ..DomNode::default()
        })
    }

    pub(crate) fn new_node(&mut self, data: DomNode) -> NodeId {
        self.arena.new_node(data)
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    ///
    /// # Errors
    /// Fails when `child` is an ancestor of `parent` or either node is unknown.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.ensure_live(parent)?;
        child.detach(&mut self.arena);
        parent.checked_append(child, &mut self.arena)?;
        Ok(())
    }

    /// Insert `node` immediately before `reference`.
    ///
    /// # Errors
    /// Fails when `reference` has no parent or the insertion would create a cycle.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<()> {
        self.ensure_attached(reference)?;
        node.detach(&mut self.arena);
        reference.checked_insert_before(node, &mut self.arena)?;
        Ok(())
    }

    /// Detach a subtree. Its ids stay valid until the next
    /// [`Document::reclaim_detached`].
    pub fn detach(&mut self, node: NodeId) {
        if self.is_live(node) {
            node.detach(&mut self.arena);
        }
    }

    /// Free every detached subtree that contains none of `keep`. Returns the
    /// number of subtrees freed.
    pub fn reclaim_detached(&mut self, keep: &[NodeId]) -> usize {
        let root = self.root;
        let doomed: Vec<NodeId> = self
            .arena
            .roots()
            .filter(|candidate| *candidate != root)
            .filter(|candidate| !keep.iter().any(|held| self.contains(*candidate, *held)))
            .collect();
        for node in &doomed {
            node.remove_subtree(&mut self.arena);
        }
        if !doomed.is_empty() {
            trace!("reclaimed {} detached subtrees", doomed.len());
        }
        doomed.len()
    }

    /// Detach and return every child of `node`.
    pub fn take_children(&mut self, node: NodeId) -> Vec<NodeId> {
        let children = self.children(node);
        for child in &children {
            child.detach(&mut self.arena);
        }
        children
    }

    pub fn remove_children(&mut self, node: NodeId) {
        let _removed = self.take_children(node);
    }

    /// Replace all children with a single text node (none for empty text).
    ///
    /// # Errors
    /// Fails when `node` is unknown.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<()> {
        self.ensure_live(node)?;
        self.remove_children(node);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node)?;
        }
        Ok(())
    }

    /// Deep copy of a subtree; the copy is detached.
    ///
    /// # Errors
    /// Fails when `node` is unknown.
    pub fn deep_clone(&mut self, node: NodeId) -> Result<NodeId> {
        let data = self
            .node(node)
            .cloned()
            .ok_or_else(|| anyhow!("cannot clone unknown node {node}"))?;
        let copy = self.arena.new_node(data);
        for child in self.children(node) {
            let child_copy = self.deep_clone(child)?;
            copy.checked_append(child_copy, &mut self.arena)?;
        }
        Ok(copy)
    }

    fn ensure_live(&self, node: NodeId) -> Result<()> {
        if self.arena.get(node).is_none_or(Node::is_removed) {
            return Err(anyhow!("node {node} is not part of this document"));
        }
        Ok(())
    }

    fn ensure_attached(&self, node: NodeId) -> Result<()> {
        self.ensure_live(node)?;
        if self.parent(node).is_none() {
            return Err(anyhow!("node {node} has no parent to insert beside"));
        }
        Ok(())
    }
}
