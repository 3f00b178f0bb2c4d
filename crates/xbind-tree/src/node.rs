//! Node handles, kinds and qualified names

use std::fmt;

/// Handle of a node inside a [`Document`](crate::Document) arena.
///
/// Handles stay valid after the node is detached from its parent. Once the
/// node is removed its slot may be reused; the generation tells a stale
/// handle from the slot's new occupant, and stale handles resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Raw arena index
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

/// Kind of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The document node (one per document, arena slot 0)
    Document,
    /// Element node
    Element,
    /// Attribute node (only ever addressed through its owner element)
    Attribute,
    /// Text node
    Text,
    /// Comment node
    Comment,
}

impl NodeKind {
    /// Numeric code used for ordering and hashing (DOM node type numbers)
    pub fn code(self) -> u8 {
        match self {
            NodeKind::Element => 1,
            NodeKind::Attribute => 2,
            NodeKind::Text => 3,
            NodeKind::Comment => 8,
            NodeKind::Document => 9,
        }
    }
}

/// Qualified name of an element or attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace prefix, if any
    pub prefix: Option<String>,
    /// Local part of the name
    pub local: String,
    /// Namespace URI, if any
    pub namespace: Option<String>,
}

impl QName {
    /// Parse a `prefix:local` or `local` name without namespace URI
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
                namespace: None,
            },
            _ => Self {
                prefix: None,
                local: qualified.to_string(),
                namespace: None,
            },
        }
    }

    /// Attach a namespace URI
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The `prefix:local` form
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    /// Whether the qualified form equals `name`
    pub fn matches(&self, name: &str) -> bool {
        match &self.prefix {
            Some(prefix) => name
                .split_once(':')
                .is_some_and(|(p, l)| p == prefix && l == self.local),
            None => name == self.local,
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{}:", prefix)?;
        }
        write!(f, "{}", self.local)
    }
}

impl From<&str> for QName {
    fn from(value: &str) -> Self {
        QName::parse(value)
    }
}

impl From<String> for QName {
    fn from(value: String) -> Self {
        QName::parse(&value)
    }
}

/// An attribute of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: QName,
    /// Attribute value
    pub value: String,
}

impl Attribute {
    /// Create an attribute
    pub fn new(name: impl Into<QName>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether this is a namespace declaration (`xmlns` or `xmlns:p`)
    pub fn is_namespace_declaration(&self) -> bool {
        self.name.prefix.as_deref() == Some("xmlns")
            || (self.name.prefix.is_none() && self.name.local == "xmlns")
    }
}

/// Reference to any node a path can select: a tree node or an attribute of
/// an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Document, element, text or comment node
    Node(NodeId),
    /// Attribute `name` (qualified form) of element `owner`
    Attribute {
        /// Owning element
        owner: NodeId,
        /// Qualified attribute name
        name: String,
    },
}

impl NodeRef {
    /// The tree node itself, or the owner of an attribute
    pub fn anchor(&self) -> NodeId {
        match self {
            NodeRef::Node(id) => *id,
            NodeRef::Attribute { owner, .. } => *owner,
        }
    }

    /// The tree node when this is not an attribute
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            NodeRef::Node(id) => Some(*id),
            NodeRef::Attribute { .. } => None,
        }
    }

    /// Whether this references an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(self, NodeRef::Attribute { .. })
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Node(id)
    }
}
