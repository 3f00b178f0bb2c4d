//! Live views
//!
//! Auto views keep a context node and a path and re-evaluate the path on
//! every access; nothing is cached. Writes go through the duplex analyzer
//! like projection writes do, and notify the projector's observers.

use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutexGuard;
use xbind_path::{analyze, resolve_existing, select_nodes, CompiledPath, WriteStep, WriteTarget};
use xbind_tree::{Document, NodeId, NodeRef};

use crate::contract::ValueType;
use crate::dispatch::{apply_text, remove_target, write_payload};
use crate::document::DocumentRef;
use crate::error::{ProjectionError, Result};
use crate::materialize::Payload;
use crate::projector::Projector;
use crate::value::Value;

/// Context node and path shared by all view kinds
#[derive(Clone)]
struct ViewBase {
    projector: Projector,
    document: DocumentRef,
    context: NodeId,
    path: String,
    value_type: ValueType,
}

impl ViewBase {
    fn call_lock(&self) -> Option<ReentrantMutexGuard<'_, ()>> {
        self.projector
            .flags()
            .synchronize_on_documents
            .then(|| self.document.lock_calls())
    }

    fn select(&self, tree: &Document, path: &str) -> Result<Vec<NodeRef>> {
        let compiled = CompiledPath::compile(path)?;
        let namespaces = self.projector.namespaces(tree);
        Ok(select_nodes(&compiled, tree, &NodeRef::Node(self.context), &namespaces)?)
    }

    fn convert(&self, tree: &Document, node: &NodeRef) -> Result<Value> {
        let text = xbind_path::node_string_value(tree, node);
        if self.value_type != ValueType::String && text.trim().is_empty() {
            return Ok(Value::Null);
        }
        self.projector.converters().to_value(&text, &self.value_type)
    }

    fn render(&self, value: &Value) -> Result<String> {
        self.projector.converters().to_text(value, &self.value_type)
    }

    fn values(&self, path: &str) -> Result<Vec<Value>> {
        let tree = self.document.read();
        self.select(&tree, path)?
            .iter()
            .map(|node| self.convert(&tree, node))
            .collect()
    }

    fn first(&self, path: &str) -> Result<Option<Value>> {
        let tree = self.document.read();
        match self.select(&tree, path)?.first() {
            Some(node) => self.convert(&tree, node).map(Some),
            None => Ok(None),
        }
    }

    fn write(&self, path: &str, value: &Value) -> Result<()> {
        let _calls = self.call_lock();
        let payload = if value.is_null() {
            Payload::Remove
        } else {
            Payload::Text(self.render(value)?)
        };
        let write_path = analyze(&CompiledPath::compile(path)?)?;
        let count = {
            let mut tree = self.document.write();
            let namespaces = self.projector.namespaces(&tree);
            write_payload(&mut tree, &write_path, self.context, &payload, &namespaces)?
        };
        if count > 0 {
            self.projector.notify_changed(&self.document);
        }
        Ok(())
    }

    fn remove_all(&self, path: &str) -> Result<usize> {
        let _calls = self.call_lock();
        let compiled = CompiledPath::compile(path)?;
        let removed = {
            let mut tree = self.document.write();
            let namespaces = self.projector.namespaces(&tree);
            let targets = resolve_existing(&compiled, &tree, &NodeRef::Node(self.context), &namespaces)?;
            let mut removed = 0;
            for target in &targets {
                if remove_target(&mut tree, target)? {
                    removed += 1;
                }
            }
            removed
        };
        if removed > 0 {
            self.projector.notify_changed(&self.document);
        }
        Ok(removed)
    }

    fn same_view(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.document, &other.document)
            && self.context == other.context
            && self.path == other.path
            && self.value_type == other.value_type
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>, kind: &str) -> fmt::Result {
        f.debug_struct(kind)
            .field("context", &self.context)
            .field("path", &self.path)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Live view of the first node a path selects
#[derive(Clone)]
pub struct AutoValue {
    base: ViewBase,
}

impl AutoValue {
    pub(crate) fn new(
        projector: Projector,
        document: DocumentRef,
        context: NodeId,
        path: String,
        value_type: ValueType,
    ) -> Self {
        Self {
            base: ViewBase {
                projector,
                document,
                context,
                path,
                value_type,
            },
        }
    }

    /// Path the view is bound to
    pub fn path(&self) -> &str {
        &self.base.path
    }

    /// Current value; `Null` when no node matches
    pub fn get(&self) -> Result<Value> {
        Ok(self.base.first(&self.base.path)?.unwrap_or(Value::Null))
    }

    /// Write the value, creating the destination when missing. `Null`
    /// removes it.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.base.write(&self.base.path, &value.into())
    }

    /// Remove every node the path selects; true when something was removed
    pub fn remove(&self) -> Result<bool> {
        Ok(self.base.remove_all(&self.base.path)? > 0)
    }

    /// Whether the path selects anything
    pub fn exists(&self) -> Result<bool> {
        let tree = self.base.document.read();
        Ok(!self.base.select(&tree, &self.base.path)?.is_empty())
    }
}

impl PartialEq for AutoValue {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_view(&other.base)
    }
}

impl fmt::Debug for AutoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.describe(f, "AutoValue")
    }
}

/// Live view of every node a path selects, in document order
#[derive(Clone)]
pub struct AutoList {
    base: ViewBase,
}

impl AutoList {
    pub(crate) fn new(
        projector: Projector,
        document: DocumentRef,
        context: NodeId,
        path: String,
        value_type: ValueType,
    ) -> Self {
        Self {
            base: ViewBase {
                projector,
                document,
                context,
                path,
                value_type,
            },
        }
    }

    /// Path the view is bound to
    pub fn path(&self) -> &str {
        &self.base.path
    }

    /// Number of items
    pub fn len(&self) -> Result<usize> {
        let tree = self.base.document.read();
        Ok(self.base.select(&tree, &self.base.path)?.len())
    }

    /// Whether there are no items
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Result<Option<Value>> {
        let tree = self.base.document.read();
        match self.base.select(&tree, &self.base.path)?.get(index) {
            Some(node) => self.base.convert(&tree, node).map(Some),
            None => Ok(None),
        }
    }

    /// All items
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        self.base.values(&self.base.path)
    }

    /// Append an item after the existing ones
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let _calls = self.base.call_lock();
        let text = self.base.render(&value.into())?;
        let write_path = analyze(&CompiledPath::compile(&self.base.path)?)?;
        let (parent_path, last) = match write_path.split_last() {
            Some((parent_path, last)) if matches!(last, WriteStep::Element { .. }) => (parent_path, last),
            _ => {
                return Err(ProjectionError::NonWritablePath(format!(
                    "'{}' must end in an element step to append items",
                    self.base.path
                )))
            }
        };
        {
            let mut tree = self.base.document.write();
            let namespaces = self.base.projector.namespaces(&tree);
            let parent = match parent_path.resolve(&mut tree, self.base.context, true, &namespaces)? {
                Some(WriteTarget::Element(parent)) => parent,
                _ => {
                    return Err(ProjectionError::NonWritablePath(format!(
                        "'{}' has no parent element for items",
                        self.base.path
                    )))
                }
            };
            let element = parent_path.create(last, &mut tree, parent, &namespaces)?;
            tree.set_text_content(element, &text)?;
        }
        self.base.projector.notify_changed(&self.base.document);
        Ok(())
    }

    /// Overwrite the item at `index`, returning its previous value; `None`
    /// (and no change) when there is no such item
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Option<Value>> {
        let _calls = self.base.call_lock();
        let text = self.base.render(&value.into())?;
        let previous = {
            let mut tree = self.base.document.write();
            let Some(node) = self.base.select(&tree, &self.base.path)?.into_iter().nth(index) else {
                return Ok(None);
            };
            let previous = self.base.convert(&tree, &node)?;
            apply_text(&mut tree, &node, &text)?;
            previous
        };
        self.base.projector.notify_changed(&self.base.document);
        Ok(Some(previous))
    }

    /// Remove the item at `index`, returning its value
    pub fn remove(&self, index: usize) -> Result<Option<Value>> {
        let _calls = self.base.call_lock();
        let previous = {
            let mut tree = self.base.document.write();
            let Some(node) = self.base.select(&tree, &self.base.path)?.into_iter().nth(index) else {
                return Ok(None);
            };
            let previous = self.base.convert(&tree, &node)?;
            remove_target(&mut tree, &node)?;
            previous
        };
        self.base.projector.notify_changed(&self.base.document);
        Ok(Some(previous))
    }

    /// Remove every item, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        self.base.remove_all(&self.base.path)
    }
}

impl PartialEq for AutoList {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_view(&other.base)
    }
}

impl fmt::Debug for AutoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.describe(f, "AutoList")
    }
}

/// Live map whose keys are paths relative to a base element
#[derive(Clone)]
pub struct AutoMap {
    base: ViewBase,
}

impl AutoMap {
    pub(crate) fn new(
        projector: Projector,
        document: DocumentRef,
        context: NodeId,
        path: String,
        value_type: ValueType,
    ) -> Self {
        Self {
            base: ViewBase {
                projector,
                document,
                context,
                path,
                value_type,
            },
        }
    }

    /// Base path keys are resolved against
    pub fn path(&self) -> &str {
        &self.base.path
    }

    /// The document the map writes into
    pub fn document(&self) -> &DocumentRef {
        &self.base.document
    }

    /// Full path of `key`; absolute keys are taken as they are
    fn key_path(&self, key: &str) -> String {
        if key.starts_with('/') {
            key.to_string()
        } else {
            format!("{}/{}", self.base.path.trim_end_matches('/'), key)
        }
    }

    /// Value at `key`; `Null` when absent
    pub fn get(&self, key: &str) -> Result<Value> {
        Ok(self.base.first(&self.key_path(key))?.unwrap_or(Value::Null))
    }

    /// Whether `key` selects anything
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        let tree = self.base.document.read();
        Ok(!self.base.select(&tree, &self.key_path(key))?.is_empty())
    }

    /// Write `value` at `key`, creating missing nodes; returns the previous
    /// value or `Null`
    pub fn put(&self, key: &str, value: impl Into<Value>) -> Result<Value> {
        let path = self.key_path(key);
        let _calls = self.base.call_lock();
        let previous = self.base.first(&path)?.unwrap_or(Value::Null);
        self.base.write(&path, &value.into())?;
        Ok(previous)
    }

    /// Remove everything `key` selects; returns the previous value or `Null`
    pub fn remove(&self, key: &str) -> Result<Value> {
        let path = self.key_path(key);
        let _calls = self.base.call_lock();
        let previous = self.base.first(&path)?.unwrap_or(Value::Null);
        self.base.remove_all(&path)?;
        Ok(previous)
    }

    /// Attribute names (`@name`) and distinct child element names of the
    /// base element (or document), in document order
    pub fn keys(&self) -> Result<Vec<String>> {
        let tree = self.base.document.read();
        let base = self.base.select(&tree, &self.base.path)?;
        let Some(element) = base
            .iter()
            .filter_map(NodeRef::as_node)
            .find(|id| tree.is_element(*id) || *id == tree.document_node())
        else {
            return Ok(Vec::new());
        };

        let mut keys: Vec<String> = tree
            .attributes(element)
            .iter()
            .filter(|a| !a.is_namespace_declaration())
            .map(|a| format!("@{}", a.name.qualified()))
            .collect();
        for child in tree.element_children(element) {
            if let Some(name) = tree.name(child).map(|n| n.qualified()) {
                if !keys.contains(&name) {
                    keys.push(name);
                }
            }
        }
        Ok(keys)
    }
}

impl PartialEq for AutoMap {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_view(&other.base)
    }
}

impl fmt::Debug for AutoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.describe(f, "AutoMap")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::document::SharedDocument;

    fn list(path: &str) -> (AutoList, DocumentRef) {
        let document = SharedDocument::new(Document::new());
        let node = document.read().document_node();
        let view = AutoList::new(Projector::new(), document.clone(), node, path.to_string(), ValueType::int());
        (view, document)
    }

    #[test]
    fn test_auto_list_operations() {
        let (items, _doc) = list("/list/item");
        assert!(items.is_empty().unwrap());
        items.push(1i64).unwrap();
        items.push(2i64).unwrap();
        items.push(3i64).unwrap();
        assert_eq!(items.to_vec().unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        assert_eq!(items.set(1, 20i64).unwrap(), Some(Value::Int(2)));
        assert_eq!(items.get(1).unwrap(), Some(Value::Int(20)));
        assert_eq!(items.set(9, 0i64).unwrap(), None);

        assert_eq!(items.remove(0).unwrap(), Some(Value::Int(1)));
        assert_eq!(items.to_vec().unwrap(), vec![Value::Int(20), Value::Int(3)]);
        assert_eq!(items.clear().unwrap(), 2);
        assert_eq!(items.len().unwrap(), 0);
    }

    #[test]
    fn test_auto_list_rejects_attribute_items() {
        let (items, _doc) = list("/list/@item");
        let err = items.push(1i64).unwrap_err();
        assert!(matches!(err, ProjectionError::NonWritablePath(_)));
    }

    #[test]
    fn test_auto_map() {
        let map = Projector::new().auto_map_empty_document(ValueType::String);
        assert_eq!(map.put("config/name", "x").unwrap(), Value::Null);
        assert_eq!(map.put("config/name", "y").unwrap(), Value::from("x"));
        map.put("config/@version", "2").unwrap();
        map.put("/config/port", "80").unwrap();

        assert_eq!(map.get("config/name").unwrap(), Value::from("y"));
        assert!(map.contains_key("config/port").unwrap());
        assert!(!map.contains_key("config/host").unwrap());
        assert_eq!(map.keys().unwrap(), vec!["config".to_string()]);

        let nested = AutoMap::new(
            Projector::new(),
            map.document().clone(),
            map.document().read().document_node(),
            "/config".to_string(),
            ValueType::String,
        );
        assert_eq!(
            nested.keys().unwrap(),
            vec!["@version".to_string(), "name".to_string(), "port".to_string()]
        );
        assert_eq!(nested.remove("name").unwrap(), Value::from("y"));
        assert_eq!(nested.get("name").unwrap(), Value::Null);
    }

    #[test]
    fn test_auto_value() {
        let document = SharedDocument::new(Document::new());
        let node = document.read().document_node();
        let value = AutoValue::new(
            Projector::new(),
            document.clone(),
            node,
            "/a/b/@flag".to_string(),
            ValueType::Bool,
        );
        assert!(!value.exists().unwrap());
        assert_eq!(value.get().unwrap(), Value::Null);
        value.set(true).unwrap();
        assert_eq!(value.get().unwrap(), Value::Bool(true));
        assert!(value.remove().unwrap());
        assert!(!value.exists().unwrap());
        assert!(document.read().document_element().is_some());
    }
}
