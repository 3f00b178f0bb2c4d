//! Arena-backed mutable document
//!
//! All nodes of a document live in one arena; [`NodeId`] handles index into
//! it. Detaching keeps a node (and every handle to it) alive so it can be
//! reinserted. Removing frees the whole subtree: its slots go on a free list
//! for later nodes, and the bumped slot generation makes old handles resolve
//! to nothing instead of to the new occupant.

use std::collections::HashMap;

use tracing::trace;

use crate::error::TreeError;
use crate::node::{Attribute, NodeId, NodeKind, QName};

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(QName),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<Attribute>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// Detached copy of a subtree, used to move content between documents
/// without holding locks on both at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Element with its attributes and children
    Element {
        /// Element name
        name: QName,
        /// Attributes in document order
        attributes: Vec<Attribute>,
        /// Children in document order
        children: Vec<Fragment>,
    },
    /// Text content
    Text(String),
    /// Comment content
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A mutable, ordered, attributed tree
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (document node only)
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(NodeData::Document)),
            }],
            free: Vec::new(),
        }
    }

    /// Create a document whose document element is `name`
    pub fn with_root(name: impl Into<QName>) -> Self {
        let mut doc = Self::new();
        let root = doc.create_element(name);
        let document = doc.document_node();
        if let Some(node) = doc.slots[root.index].node.as_mut() {
            node.parent = Some(document);
        }
        if let Some(node) = doc.slots[document.index].node.as_mut() {
            node.children.push(root);
        }
        doc
    }

    /// The document node
    pub fn document_node(&self) -> NodeId {
        NodeId::new(0, 0)
    }

    /// The single element child of the document node, if any
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.document_node()).next()
    }

    /// Whether `id` names a live node of this arena
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes, attached or not
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of arena slots, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::UnknownNode(id))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(Node::new(data));
            return NodeId::new(index, slot.generation);
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(Node::new(data)),
        });
        NodeId::new(self.slots.len() - 1, 0)
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Kind of the node
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(|n| match n.data {
            NodeData::Document => NodeKind::Document,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        })
    }

    /// Whether the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == Some(NodeKind::Element)
    }

    /// Element name
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match &self.node(id)?.data {
            NodeData::Element(name) => Some(name),
            _ => None,
        }
    }

    /// Parent node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Children in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Element children in document order
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    /// Attributes in document order
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.node(id).map(|n| n.attributes.as_slice()).unwrap_or(&[])
    }

    /// Attribute value by qualified name
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.matches(name))
            .map(|a| a.value.as_str())
    }

    /// Content of a text or comment node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Text(t) | NodeData::Comment(t) => Some(t),
            _ => None,
        }
    }

    /// String value: concatenated descendant text for documents and
    /// elements, content for text and comment nodes
    pub fn string_value(&self, id: NodeId) -> String {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Text(t)) | Some(NodeData::Comment(t)) => t.clone(),
            Some(_) => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            None => String::new(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in self.children(id) {
            match self.node(*child).map(|n| &n.data) {
                Some(NodeData::Text(t)) => out.push_str(t),
                Some(NodeData::Element(_)) => self.collect_text(*child, out),
                _ => {}
            }
        }
    }

    /// Top-most ancestor (the document node for attached nodes)
    pub fn tree_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Whether the node is reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.tree_root(id) == self.document_node()
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    /// Descendants in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Position of `child` among its parent's children
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|c| *c == child)
    }

    // ── Construction ─────────────────────────────────────────────────────

    /// Create a detached element
    pub fn create_element(&mut self, name: impl Into<QName>) -> NodeId {
        self.push(NodeData::Element(name.into()))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Comment(text.into()))
    }

    /// Append `child` as last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    /// Insert `child` at `index` among the children of `parent`
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        let node = self.node_mut(parent)?;
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent_kind = self.kind(parent).ok_or(TreeError::UnknownNode(parent))?;
        let child_kind = self.kind(child).ok_or(TreeError::UnknownNode(child))?;
        if !matches!(parent_kind, NodeKind::Document | NodeKind::Element) {
            return Err(TreeError::NotAContainer(parent));
        }
        if child_kind == NodeKind::Document {
            return Err(TreeError::HierarchyRequest(
                "document node cannot be inserted".into(),
            ));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::HierarchyRequest(format!(
                "{} is an ancestor of {}",
                child, parent
            )));
        }
        if parent_kind == NodeKind::Document {
            if child_kind == NodeKind::Text {
                return Err(TreeError::HierarchyRequest(
                    "text cannot be a child of the document node".into(),
                ));
            }
            if child_kind == NodeKind::Element
                && self
                    .document_element()
                    .is_some_and(|existing| existing != child)
            {
                return Err(TreeError::HierarchyRequest(
                    "document already has a document element".into(),
                ));
            }
        }
        Ok(())
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.parent(child) != Some(parent) {
            return Err(TreeError::HierarchyRequest(format!(
                "{} is not a child of {}",
                child, parent
            )));
        }
        self.detach(child)
    }

    /// Detach a node from its parent (no-op when already detached)
    pub fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        let parent = self.node_mut(id)?.parent.take();
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        Ok(())
    }

    /// Detach a node and free it together with its descendants. Handles
    /// into the subtree go stale.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.document_node() {
            return Err(TreeError::HierarchyRequest(
                "the document node cannot be removed".into(),
            ));
        }
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.node(next).is_none() {
                continue;
            }
            let slot = &mut self.slots[next.index];
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(next.index);
        }
        Ok(())
    }

    /// Set (create or overwrite) an attribute
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        name: impl Into<QName>,
        value: impl Into<String>,
    ) -> Result<(), TreeError> {
        if !self.is_element(element) {
            return Err(TreeError::NotAnElement(element));
        }
        let name = name.into();
        let value = value.into();
        let node = self.node_mut(element)?;
        let qualified = name.qualified();
        match node.attributes.iter_mut().find(|a| a.name.matches(&qualified)) {
            Some(existing) => existing.value = value,
            None => node.attributes.push(Attribute { name, value }),
        }
        Ok(())
    }

    /// Remove an attribute, returning its former value
    pub fn remove_attribute(
        &mut self,
        element: NodeId,
        name: &str,
    ) -> Result<Option<String>, TreeError> {
        let node = self.node_mut(element)?;
        let position = node.attributes.iter().position(|a| a.name.matches(name));
        Ok(position.map(|p| node.attributes.remove(p).value))
    }

    /// Replace the content of a text or comment node
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), TreeError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(t) | NodeData::Comment(t) => {
                *t = text.into();
                Ok(())
            }
            _ => Err(TreeError::HierarchyRequest(format!(
                "{} is not a text node",
                id
            ))),
        }
    }

    /// Replace all children of an element with a single text node
    /// (no text node when `text` is empty). A lone existing text child is
    /// rewritten in place; anything else is removed.
    pub fn set_text_content(&mut self, element: NodeId, text: &str) -> Result<(), TreeError> {
        if !self.is_element(element) {
            return Err(TreeError::NotAnElement(element));
        }
        if let [only] = self.children(element) {
            let only = *only;
            if !text.is_empty() && self.kind(only) == Some(NodeKind::Text) {
                return self.set_text(only, text);
            }
        }
        for child in self.children(element).to_vec() {
            self.remove(child)?;
        }
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(element, t)?;
        }
        Ok(())
    }

    /// Drop all attributes and children of an element
    pub fn clear_element(&mut self, element: NodeId) -> Result<(), TreeError> {
        self.set_text_content(element, "")?;
        self.node_mut(element)?.attributes.clear();
        Ok(())
    }

    // ── Fragments ────────────────────────────────────────────────────────

    /// Capture a detached copy of a subtree. The document node yields its
    /// document element.
    pub fn fragment(&self, id: NodeId) -> Result<Fragment, TreeError> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        match &node.data {
            NodeData::Document => {
                let element = self.document_element().ok_or(TreeError::NotAnElement(id))?;
                self.fragment(element)
            }
            NodeData::Element(name) => Ok(Fragment::Element {
                name: name.clone(),
                attributes: node.attributes.clone(),
                children: node
                    .children
                    .iter()
                    .map(|c| self.fragment(*c))
                    .collect::<Result<_, _>>()?,
            }),
            NodeData::Text(t) => Ok(Fragment::Text(t.clone())),
            NodeData::Comment(t) => Ok(Fragment::Comment(t.clone())),
        }
    }

    /// Materialize a fragment as a detached subtree
    pub fn build(&mut self, fragment: &Fragment) -> Result<NodeId, TreeError> {
        match fragment {
            Fragment::Element {
                name,
                attributes,
                children,
            } => {
                let element = self.create_element(name.clone());
                self.node_mut(element)?.attributes = attributes.clone();
                for child in children {
                    let built = self.build(child)?;
                    self.append_child(element, built)?;
                }
                Ok(element)
            }
            Fragment::Text(t) => Ok(self.create_text(t.clone())),
            Fragment::Comment(t) => Ok(self.create_comment(t.clone())),
        }
    }

    /// Replace attributes and children of `element` with those of an element
    /// fragment, keeping the element's own name
    pub fn replace_content(
        &mut self,
        element: NodeId,
        fragment: &Fragment,
    ) -> Result<(), TreeError> {
        self.clear_element(element)?;
        match fragment {
            Fragment::Element {
                attributes,
                children,
                ..
            } => {
                self.node_mut(element)?.attributes = attributes.clone();
                for child in children {
                    let built = self.build(child)?;
                    self.append_child(element, built)?;
                }
            }
            Fragment::Text(t) => {
                let built = self.create_text(t.clone());
                self.append_child(element, built)?;
            }
            Fragment::Comment(t) => {
                let built = self.create_comment(t.clone());
                self.append_child(element, built)?;
            }
        }
        Ok(())
    }

    // ── DOM helpers ──────────────────────────────────────────────────────

    /// Prefix → URI mapping declared with `xmlns:` on the document element
    pub fn namespace_mapping(&self) -> HashMap<String, String> {
        let Some(root) = self.document_element() else {
            return HashMap::new();
        };
        self.attributes(root)
            .iter()
            .filter(|a| a.name.prefix.as_deref() == Some("xmlns"))
            .map(|a| (a.name.local.clone(), a.value.clone()))
            .collect()
    }

    /// Replace the document element; the previous one is removed
    pub fn set_document_element(&mut self, element: Option<NodeId>) -> Result<(), TreeError> {
        if let Some(current) = self.document_element() {
            if Some(current) == element {
                return Ok(());
            }
            self.remove(current)?;
        }
        if let Some(element) = element {
            if !self.is_element(element) {
                return Err(TreeError::NotAnElement(element));
            }
            self.append_child(self.document_node(), element)?;
        }
        Ok(())
    }

    /// Remove every child element of `parent` accepted by `matches`,
    /// returning how many were removed
    pub fn remove_children_where<F>(&mut self, parent: NodeId, matches: F) -> Result<usize, TreeError>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        let doomed: Vec<NodeId> = self
            .element_children(parent)
            .filter(|c| matches(self, *c))
            .collect();
        for child in &doomed {
            self.remove(*child)?;
        }
        Ok(doomed.len())
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> (Document, NodeId) {
        let mut doc = Document::with_root("catalog");
        let root = doc.document_element().unwrap();
        for title in ["Dune", "Emma"] {
            let book = doc.create_element("book");
            doc.set_attribute(book, "lang", "en").unwrap();
            doc.set_text_content(book, title).unwrap();
            doc.append_child(root, book).unwrap();
        }
        (doc, root)
    }

    #[test]
    fn test_string_value_concatenates_descendants() {
        let (doc, root) = catalog();
        assert_eq!(doc.string_value(root), "DuneEmma");
        assert_eq!(doc.string_value(doc.document_node()), "DuneEmma");
    }

    #[test]
    fn test_second_document_element_rejected() {
        let mut doc = Document::with_root("a");
        let other = doc.create_element("b");
        let result = doc.append_child(doc.document_node(), other);
        assert!(matches!(result, Err(TreeError::HierarchyRequest(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut doc, root) = catalog();
        let book = doc.children(root)[0];
        assert!(doc.append_child(book, root).is_err());
    }

    #[test]
    fn test_detach_keeps_handle_valid() {
        let (mut doc, root) = catalog();
        let book = doc.children(root)[0];
        doc.remove_child(root, book).unwrap();
        assert_eq!(doc.children(root).len(), 1);
        assert!(!doc.is_attached(book));
        assert_eq!(doc.string_value(book), "Dune");
    }

    #[test]
    fn test_set_attribute_overwrites() {
        let (mut doc, root) = catalog();
        doc.set_attribute(root, "version", "1").unwrap();
        doc.set_attribute(root, "version", "2").unwrap();
        assert_eq!(doc.attributes(root).len(), 1);
        assert_eq!(doc.attribute(root, "version"), Some("2"));
        assert_eq!(
            doc.remove_attribute(root, "version").unwrap(),
            Some("2".to_string())
        );
        assert_eq!(doc.attribute(root, "version"), None);
    }

    #[test]
    fn test_fragment_build_across_documents() {
        let (doc, root) = catalog();
        let mut other = Document::new();
        let copy = other.build(&doc.fragment(root).unwrap()).unwrap();
        other.set_document_element(Some(copy)).unwrap();
        assert_eq!(other.string_value(other.document_node()), "DuneEmma");
        assert_eq!(other.element_children(copy).count(), 2);
    }

    #[test]
    fn test_replace_content_keeps_name() {
        let (mut doc, root) = catalog();
        let target = doc.children(root)[1];
        let source = doc.fragment(doc.children(root)[0]).unwrap();
        doc.set_attribute(target, "extra", "x").unwrap();
        doc.replace_content(target, &source).unwrap();
        assert_eq!(doc.name(target).unwrap().local, "book");
        assert_eq!(doc.attribute(target, "extra"), None);
        assert_eq!(doc.string_value(target), "Dune");
    }

    #[test]
    fn test_namespace_mapping() {
        let mut doc = Document::with_root("kml");
        let root = doc.document_element().unwrap();
        doc.set_attribute(root, "xmlns:gx", "http://www.google.com/kml/ext/2.2")
            .unwrap();
        doc.set_attribute(root, "xmlns", "http://www.opengis.net/kml/2.2")
            .unwrap();
        let mapping = doc.namespace_mapping();
        assert_eq!(mapping.len(), 1);
        assert_eq!(
            mapping.get("gx").map(String::as_str),
            Some("http://www.google.com/kml/ext/2.2")
        );
    }

    #[test]
    fn test_set_document_element_and_remove_children() {
        let (mut doc, root) = catalog();
        let removed = doc
            .remove_children_where(root, |d, c| d.attribute(c, "lang") == Some("en"))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(doc.node_count(), 2);
        let replacement = doc.create_element("library");
        doc.set_document_element(Some(replacement)).unwrap();
        assert_eq!(doc.document_element(), Some(replacement));
        doc.set_document_element(None).unwrap();
        assert_eq!(doc.document_element(), None);
    }

    #[test]
    fn test_remove_frees_subtree_and_stales_handles() {
        let (mut doc, root) = catalog();
        let book = doc.children(root)[0];
        let text = doc.children(book)[0];
        let live = doc.node_count();

        doc.remove(book).unwrap();
        assert_eq!(doc.node_count(), live - 2);
        assert!(!doc.contains(book));
        assert!(!doc.contains(text));
        assert_eq!(doc.string_value(book), "");
        assert!(doc.set_attribute(book, "x", "1").is_err());

        let capacity = doc.capacity();
        let reused = doc.create_element("shelf");
        assert_eq!(doc.capacity(), capacity);
        assert_ne!(reused, book);
        assert!(doc.name(book).is_none());
        assert_eq!(doc.name(reused).unwrap().local, "shelf");
        assert!(doc.remove(doc.document_node()).is_err());
    }

    #[test]
    fn test_repeated_overwrites_keep_arena_bounded() {
        let (mut doc, root) = catalog();
        let mut book = doc.children(root)[0];
        doc.set_text_content(book, "first").unwrap();
        let capacity = doc.capacity();
        for i in 0..1000 {
            doc.set_text_content(book, &i.to_string()).unwrap();
            doc.clear_element(root).unwrap();
            book = doc.create_element("book");
            doc.append_child(root, book).unwrap();
            doc.set_text_content(book, "x").unwrap();
        }
        assert!(doc.capacity() <= capacity + 2);
    }
}
