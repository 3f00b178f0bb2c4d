//! Projections
//!
//! A [`Projection`] is a typed view bound to one node of a shared document.
//! Calls go through [`Projection::invoke`]; the bound node never changes,
//! while the tree underneath may be changed through any projection sharing
//! the document.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use xbind_tree::{node_hash, nodes_equal, to_xml_string, NodeId};

use crate::classify::BoundContract;
use crate::dispatch;
use crate::document::DocumentRef;
use crate::error::Result;
use crate::projector::Projector;
use crate::value::Value;

/// Structural hash memoized together with the document generation it was
/// computed at
#[derive(Default)]
struct HashMemo {
    cached: Mutex<Option<(u64, u64)>>,
}

/// A typed view bound to one tree node
#[derive(Clone)]
pub struct Projection {
    projector: Projector,
    document: DocumentRef,
    node: NodeId,
    contract: Arc<BoundContract>,
    hash: Arc<HashMemo>,
}

impl Projection {
    pub(crate) fn new(
        projector: Projector,
        document: DocumentRef,
        node: NodeId,
        contract: Arc<BoundContract>,
    ) -> Self {
        Self {
            projector,
            document,
            node,
            contract,
            hash: Arc::new(HashMemo::default()),
        }
    }

    /// Call `operation` with `args`
    pub fn invoke(&self, operation: &str, args: &[Value]) -> Result<Value> {
        dispatch::invoke(self, operation, args)
    }

    /// Call a parameterless operation
    pub fn get(&self, operation: &str) -> Result<Value> {
        self.invoke(operation, &[])
    }

    /// Call a single-parameter operation
    pub fn set(&self, operation: &str, value: impl Into<Value>) -> Result<Value> {
        self.invoke(operation, &[value.into()])
    }

    /// The projector that created this projection
    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Name of the bound contract
    pub fn contract_name(&self) -> &str {
        &self.contract.name
    }

    /// The bound contract
    pub fn contract(&self) -> &Arc<BoundContract> {
        &self.contract
    }

    /// The bound node
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// The shared document
    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    /// Concatenated text below the bound node
    pub fn string_value(&self) -> String {
        self.document.read().string_value(self.node)
    }

    /// XML rendering of the bound node
    pub fn to_xml(&self) -> String {
        to_xml_string(&self.document.read(), self.node)
    }

    /// Structural hash of the bound subtree, memoized until the document
    /// is next written
    pub fn structural_hash(&self) -> u64 {
        let tree = self.document.read();
        let generation = self.document.generation();
        let mut cached = self.hash.cached.lock();
        if let Some((seen, hash)) = *cached {
            if seen == generation {
                return hash;
            }
        }
        let hash = node_hash(&tree, self.node);
        *cached = Some((generation, hash));
        hash
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.document, &other.document) {
            if self.node == other.node {
                return true;
            }
            let doc = self.document.read();
            return nodes_equal(&doc, self.node, &doc, other.node);
        }
        // Fixed lock order across the two documents
        let (first, second) = if Arc::as_ptr(&self.document) < Arc::as_ptr(&other.document) {
            (self, other)
        } else {
            (other, self)
        };
        let first_doc = first.document.read();
        let second_doc = second.document.read();
        nodes_equal(&first_doc, first.node, &second_doc, second.node)
    }
}

impl Eq for Projection {}

impl Hash for Projection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.projector.flags().to_string_renders_xml {
            f.write_str(&self.to_xml())
        } else {
            write!(f, "Projection<{}>@{}", self.contract.name, self.node)
        }
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("contract", &self.contract.name)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::{Contract, OperationDecl, ParamType, ReturnType};
    use std::collections::HashSet;

    fn projector(xml: bool) -> Projector {
        let projector = Projector::builder().to_string_renders_xml(xml).build().unwrap();
        projector
            .register_contract(
                &Contract::new("Item")
                    .operation(OperationDecl::new("name").read("/item/@name").returns(ReturnType::string()))
                    .operation(OperationDecl::new("set_name").write("/item/@name").param(ParamType::string())),
            )
            .unwrap();
        projector
    }

    #[test]
    fn test_equality_is_structural_across_documents() {
        let projector = projector(false);
        let a = projector.project_empty_document("Item").unwrap();
        let b = projector.project_empty_document("Item").unwrap();
        a.set("set_name", "x").unwrap();
        assert_ne!(a, b);
        b.set("set_name", "x").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn test_hash_follows_changes() {
        let projector = projector(false);
        let a = projector.project_empty_document("Item").unwrap();
        a.set("set_name", "x").unwrap();
        let before = a.structural_hash();
        assert_eq!(before, a.structural_hash());
        a.set("set_name", "y").unwrap();
        assert_ne!(before, a.structural_hash());

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&a));
    }

    #[test]
    fn test_hash_follows_writes_from_another_projector() {
        let first = projector(false);
        let second = projector(false);
        let a = first.project_empty_document("Item").unwrap();
        a.set("set_name", "x").unwrap();
        let stale = a.structural_hash();

        let b = second.project_shared(a.document().clone(), "Item").unwrap();
        b.set("set_name", "y").unwrap();

        let fresh = first.project_shared(a.document().clone(), "Item").unwrap();
        assert_eq!(a, fresh);
        assert_eq!(a.structural_hash(), fresh.structural_hash());
        assert_ne!(a.structural_hash(), stale);
    }

    #[test]
    fn test_hash_follows_direct_tree_writes() {
        let projector = projector(false);
        let a = projector.project_empty_document("Item").unwrap();
        a.set("set_name", "x").unwrap();
        let before = a.structural_hash();
        {
            let mut tree = a.document().write();
            let root = tree.document_element().unwrap();
            tree.set_attribute(root, "name", "z").unwrap();
        }
        assert_ne!(a.structural_hash(), before);
        assert_eq!(a.get("name").unwrap(), Value::from("z"));
    }

    #[test]
    fn test_display() {
        let plain = projector(false).project_empty_document("Item").unwrap();
        assert!(plain.to_string().starts_with("Projection<Item>@"));

        let xml = projector(true).project_empty_document("Item").unwrap();
        xml.set("set_name", "x").unwrap();
        assert!(xml.to_string().contains("<item name=\"x\""));
    }
}
