//! Structural node equality and hashing
//!
//! Two nodes are equal when their kind, name (local name, prefix, namespace)
//! and value match, their attribute sets are equal regardless of order, and
//! their children are pairwise equal in order. Nodes may come from different
//! documents. [`node_hash`] agrees with [`nodes_equal`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::document::Document;
use crate::node::{Attribute, NodeId, NodeKind, QName};

fn identity(doc: &Document, id: NodeId) -> (Option<NodeKind>, Option<&QName>, Option<&str>) {
    (doc.kind(id), doc.name(id), doc.text(id))
}

/// Structural equality of `a` in `doc_a` and `b` in `doc_b`
pub fn nodes_equal(doc_a: &Document, a: NodeId, doc_b: &Document, b: NodeId) -> bool {
    if std::ptr::eq(doc_a, doc_b) && a == b {
        return true;
    }
    if identity(doc_a, a) != identity(doc_b, b) {
        return false;
    }
    if !attributes_equal(doc_a.attributes(a), doc_b.attributes(b)) {
        return false;
    }
    let children_a = doc_a.children(a);
    let children_b = doc_b.children(b);
    children_a.len() == children_b.len()
        && children_a
            .iter()
            .zip(children_b)
            .all(|(x, y)| nodes_equal(doc_a, *x, doc_b, *y))
}

fn attributes_equal(a: &[Attribute], b: &[Attribute]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut sorted_a: Vec<&Attribute> = a.iter().collect();
    let mut sorted_b: Vec<&Attribute> = b.iter().collect();
    sorted_a.sort_by(|x, y| (&x.name, &x.value).cmp(&(&y.name, &y.value)));
    sorted_b.sort_by(|x, y| (&x.name, &x.value).cmp(&(&y.name, &y.value)));
    sorted_a == sorted_b
}

/// Structural hash consistent with [`nodes_equal`]
pub fn node_hash(doc: &Document, id: NodeId) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_into(doc, id, &mut hasher);
    hasher.finish()
}

fn hash_into(doc: &Document, id: NodeId, hasher: &mut DefaultHasher) {
    let (kind, name, text) = identity(doc, id);
    kind.map(NodeKind::code).hash(hasher);
    name.hash(hasher);
    text.hash(hasher);

    // Attribute order must not matter: combine per-attribute hashes commutatively.
    let mut attribute_sum: u64 = 0;
    for attribute in doc.attributes(id) {
        let mut h = DefaultHasher::new();
        attribute.name.hash(&mut h);
        attribute.value.hash(&mut h);
        attribute_sum = attribute_sum.wrapping_add(h.finish());
    }
    attribute_sum.hash(hasher);

    let children = doc.children(id);
    children.len().hash(hasher);
    for child in children {
        hash_into(doc, *child, hasher);
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        nodes_equal(self, self.document_node(), other, other.document_node())
    }
}

impl Eq for Document {}
