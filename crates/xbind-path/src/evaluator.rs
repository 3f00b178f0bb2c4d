//! Path evaluator: evaluates compiled expressions against a [`Document`]

use std::cell::OnceCell;
use std::collections::HashMap;

use tracing::trace;
use xbind_tree::{Document, NodeId, NodeKind, NodeRef};

use crate::ast::{Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};
use crate::error::{PathError, Result};
use crate::parser::CompiledPath;
use crate::value::{node_string_value, XPathValue};

/// Prefix to namespace URI bindings used for prefixed name tests
pub type NamespaceContext = HashMap<String, String>;

/// Evaluate `path` with `context` as the context node, resolving prefixes
/// through the document element's `xmlns:` declarations.
pub fn evaluate(path: &CompiledPath, doc: &Document, context: &NodeRef) -> Result<XPathValue> {
    let namespaces = doc.namespace_mapping();
    evaluate_with_namespaces(path, doc, context, &namespaces)
}

/// Evaluate `path` with explicit prefix bindings
pub fn evaluate_with_namespaces(
    path: &CompiledPath,
    doc: &Document,
    context: &NodeRef,
    namespaces: &NamespaceContext,
) -> Result<XPathValue> {
    trace!(path = path.source(), "evaluating path");
    let evaluator = Evaluator::new(doc, context, namespaces);
    let focus = Focus {
        node: context.clone(),
        position: 1,
        size: 1,
    };
    evaluator.eval(path.expr(), &focus)
}

/// Evaluate `path` and require a node-set result
pub fn select_nodes(
    path: &CompiledPath,
    doc: &Document,
    context: &NodeRef,
    namespaces: &NamespaceContext,
) -> Result<Vec<NodeRef>> {
    match evaluate_with_namespaces(path, doc, context, namespaces)? {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        other => Err(PathError::Type(format!(
            "'{}' evaluates to a {}, not a node-set",
            path.source(),
            other.type_name()
        ))),
    }
}

/// Context node, position and size of the current evaluation focus
#[derive(Debug, Clone)]
pub(crate) struct Focus {
    pub(crate) node: NodeRef,
    pub(crate) position: usize,
    pub(crate) size: usize,
}

pub(crate) struct Evaluator<'a> {
    pub(crate) doc: &'a Document,
    namespaces: &'a NamespaceContext,
    root: NodeId,
    order: OnceCell<HashMap<NodeId, usize>>,
}

impl<'a> Evaluator<'a> {
    fn new(doc: &'a Document, context: &NodeRef, namespaces: &'a NamespaceContext) -> Self {
        Self {
            doc,
            namespaces,
            root: doc.tree_root(context.anchor()),
            order: OnceCell::new(),
        }
    }

    // ── Document order ───────────────────────────────────────────────────

    fn order(&self) -> &HashMap<NodeId, usize> {
        self.order.get_or_init(|| {
            let mut order = HashMap::new();
            order.insert(self.root, 0);
            for (i, id) in self.doc.descendants(self.root).into_iter().enumerate() {
                order.insert(id, i + 1);
            }
            order
        })
    }

    fn sort_key(&self, node: &NodeRef) -> (usize, usize) {
        let position = |id: &NodeId| self.order().get(id).copied().unwrap_or(usize::MAX);
        match node {
            NodeRef::Node(id) => (position(id), 0),
            NodeRef::Attribute { owner, name } => {
                let index = self
                    .doc
                    .attributes(*owner)
                    .iter()
                    .position(|a| a.name.matches(name))
                    .unwrap_or(0);
                (position(owner), index + 1)
            }
        }
    }

    /// Sort into document order and drop duplicates
    pub(crate) fn normalize(&self, nodes: &mut Vec<NodeRef>) {
        nodes.sort_by_key(|n| self.sort_key(n));
        nodes.dedup();
    }

    // ── Expressions ──────────────────────────────────────────────────────

    pub(crate) fn eval(&self, expr: &Expr, focus: &Focus) -> Result<XPathValue> {
        match expr {
            Expr::Literal(s) => Ok(XPathValue::String(s.clone())),
            Expr::Number(n) => Ok(XPathValue::Number(*n)),
            Expr::Negate(inner) => Ok(XPathValue::Number(
                -self.eval(inner, focus)?.to_number(self.doc),
            )),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, focus),
            Expr::Union(a, b) => {
                let mut nodes = self.eval_node_set(a, focus)?;
                nodes.extend(self.eval_node_set(b, focus)?);
                self.normalize(&mut nodes);
                Ok(XPathValue::NodeSet(nodes))
            }
            Expr::Path(path) => Ok(XPathValue::NodeSet(self.eval_location_path(path, focus)?)),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.eval_node_set(primary, focus)?;
                for predicate in predicates {
                    nodes = self.apply_predicate(nodes, predicate)?;
                }
                Ok(XPathValue::NodeSet(self.apply_steps(nodes, steps)?))
            }
            Expr::Function { name, args } => self.call_function(name, args, focus),
        }
    }

    pub(crate) fn eval_node_set(&self, expr: &Expr, focus: &Focus) -> Result<Vec<NodeRef>> {
        match self.eval(expr, focus)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(PathError::Type(format!(
                "expected a node-set from '{}', got a {}",
                expr,
                other.type_name()
            ))),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, focus: &Focus) -> Result<XPathValue> {
        match op {
            BinaryOp::Or => {
                if self.eval(left, focus)?.to_boolean() {
                    return Ok(XPathValue::Boolean(true));
                }
                Ok(XPathValue::Boolean(self.eval(right, focus)?.to_boolean()))
            }
            BinaryOp::And => {
                if !self.eval(left, focus)?.to_boolean() {
                    return Ok(XPathValue::Boolean(false));
                }
                Ok(XPathValue::Boolean(self.eval(right, focus)?.to_boolean()))
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.eval(left, focus)?;
                let r = self.eval(right, focus)?;
                Ok(XPathValue::Boolean(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.eval(left, focus)?.to_number(self.doc);
                let r = self.eval(right, focus)?.to_number(self.doc);
                Ok(XPathValue::Number(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
        }
    }

    /// Comparison with node-set existential semantics
    fn compare(&self, op: BinaryOp, left: &XPathValue, right: &XPathValue) -> bool {
        match (left, right) {
            (XPathValue::NodeSet(a), XPathValue::NodeSet(b)) => {
                let right_strings: Vec<String> =
                    b.iter().map(|n| node_string_value(self.doc, n)).collect();
                a.iter().any(|n| {
                    let l = XPathValue::String(node_string_value(self.doc, n));
                    right_strings
                        .iter()
                        .any(|r| self.compare_atomic(op, &l, &XPathValue::String(r.clone())))
                })
            }
            (XPathValue::NodeSet(nodes), other) => nodes.iter().any(|n| {
                let l = self.node_as(n, other);
                self.compare_atomic(op, &l, other)
            }),
            (other, XPathValue::NodeSet(nodes)) => nodes.iter().any(|n| {
                let r = self.node_as(n, other);
                self.compare_atomic(op, other, &r)
            }),
            _ => self.compare_atomic(op, left, right),
        }
    }

    /// Convert a node to the type of the atomic operand it is compared with
    fn node_as(&self, node: &NodeRef, other: &XPathValue) -> XPathValue {
        let s = node_string_value(self.doc, node);
        match other {
            XPathValue::Number(_) => XPathValue::Number(crate::value::parse_number(&s)),
            XPathValue::Boolean(_) => XPathValue::Boolean(true),
            _ => XPathValue::String(s),
        }
    }

    fn compare_atomic(&self, op: BinaryOp, left: &XPathValue, right: &XPathValue) -> bool {
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = match (left, right) {
                    (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
                        left.to_boolean() == right.to_boolean()
                    }
                    (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
                        left.to_number(self.doc) == right.to_number(self.doc)
                    }
                    _ => left.to_string_value(self.doc) == right.to_string_value(self.doc),
                };
                if op == BinaryOp::Eq {
                    equal
                } else {
                    !equal
                }
            }
            _ => {
                let l = left.to_number(self.doc);
                let r = right.to_number(self.doc);
                match op {
                    BinaryOp::Lt => l < r,
                    BinaryOp::Le => l <= r,
                    BinaryOp::Gt => l > r,
                    _ => l >= r,
                }
            }
        }
    }

    // ── Location paths ───────────────────────────────────────────────────

    fn eval_location_path(&self, path: &LocationPath, focus: &Focus) -> Result<Vec<NodeRef>> {
        let start = if path.absolute {
            NodeRef::Node(self.root)
        } else {
            focus.node.clone()
        };
        self.apply_steps(vec![start], &path.steps)
    }

    fn apply_steps(&self, mut nodes: Vec<NodeRef>, steps: &[Step]) -> Result<Vec<NodeRef>> {
        for step in steps {
            let mut next = Vec::new();
            for node in &nodes {
                next.extend(self.apply_step(node, step)?);
            }
            self.normalize(&mut next);
            nodes = next;
        }
        Ok(nodes)
    }

    /// Nodes selected by one step from one context node, in axis order
    fn apply_step(&self, context: &NodeRef, step: &Step) -> Result<Vec<NodeRef>> {
        let mut selected: Vec<NodeRef> = self
            .axis_nodes(context, step.axis)
            .into_iter()
            .filter(|n| self.matches_test(n, &step.test, step.axis))
            .collect();
        for predicate in &step.predicates {
            selected = self.filter_in_order(selected, predicate)?;
        }
        Ok(selected)
    }

    /// Apply a predicate to a node-set already in document order
    fn apply_predicate(&self, mut nodes: Vec<NodeRef>, predicate: &Expr) -> Result<Vec<NodeRef>> {
        self.normalize(&mut nodes);
        self.filter_in_order(nodes, predicate)
    }

    fn filter_in_order(&self, nodes: Vec<NodeRef>, predicate: &Expr) -> Result<Vec<NodeRef>> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, &focus)? {
                XPathValue::Number(n) => n == focus.position as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(focus.node);
            }
        }
        Ok(kept)
    }

    fn axis_nodes(&self, context: &NodeRef, axis: Axis) -> Vec<NodeRef> {
        let doc = self.doc;
        let wrap = |ids: Vec<NodeId>| ids.into_iter().map(NodeRef::Node).collect::<Vec<_>>();
        let element = context.as_node();
        match axis {
            Axis::Child => element
                .map(|id| wrap(doc.children(id).to_vec()))
                .unwrap_or_default(),
            Axis::Descendant => element
                .map(|id| wrap(doc.descendants(id)))
                .unwrap_or_default(),
            Axis::DescendantOrSelf => {
                let mut out = vec![context.clone()];
                if let Some(id) = element {
                    out.extend(wrap(doc.descendants(id)));
                }
                out
            }
            Axis::SelfAxis => vec![context.clone()],
            Axis::Parent => self.parent_of(context).map(NodeRef::Node).into_iter().collect(),
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(context.clone());
                }
                let mut current = self.parent_of(context);
                while let Some(id) = current {
                    out.push(NodeRef::Node(id));
                    current = doc.parent(id);
                }
                out
            }
            Axis::Attribute => element
                .map(|id| {
                    doc.attributes(id)
                        .iter()
                        .filter(|a| !a.is_namespace_declaration())
                        .map(|a| NodeRef::Attribute {
                            owner: id,
                            name: a.name.qualified(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some(id) = element else {
                    return Vec::new();
                };
                let (Some(parent), Some(index)) = (doc.parent(id), doc.child_index(id)) else {
                    return Vec::new();
                };
                let siblings = doc.children(parent);
                if axis == Axis::FollowingSibling {
                    wrap(siblings[index + 1..].to_vec())
                } else {
                    wrap(siblings[..index].iter().rev().copied().collect())
                }
            }
            Axis::Following => {
                let mut out = Vec::new();
                let mut current = Some(context.anchor());
                if context.is_attribute() {
                    // attributes precede their owner's children
                    if let Some(owner) = current {
                        out.extend(wrap(doc.descendants(owner)));
                    }
                }
                while let Some(id) = current {
                    if let (Some(parent), Some(index)) = (doc.parent(id), doc.child_index(id)) {
                        for sibling in &doc.children(parent)[index + 1..] {
                            out.push(NodeRef::Node(*sibling));
                            out.extend(wrap(doc.descendants(*sibling)));
                        }
                    }
                    current = doc.parent(id);
                }
                out
            }
            Axis::Preceding => {
                let mut out = Vec::new();
                let mut current = Some(context.anchor());
                while let Some(id) = current {
                    if let (Some(parent), Some(index)) = (doc.parent(id), doc.child_index(id)) {
                        for sibling in doc.children(parent)[..index].iter().rev() {
                            out.extend(wrap(doc.descendants(*sibling)).into_iter().rev());
                            out.push(NodeRef::Node(*sibling));
                        }
                    }
                    current = doc.parent(id);
                }
                out
            }
        }
    }

    fn parent_of(&self, node: &NodeRef) -> Option<NodeId> {
        match node {
            NodeRef::Node(id) => self.doc.parent(*id),
            NodeRef::Attribute { owner, .. } => Some(*owner),
        }
    }

    fn matches_test(&self, node: &NodeRef, test: &NodeTest, axis: Axis) -> bool {
        match test {
            NodeTest::Node => true,
            NodeTest::Text => node
                .as_node()
                .is_some_and(|id| self.doc.kind(id) == Some(NodeKind::Text)),
            NodeTest::Comment => node
                .as_node()
                .is_some_and(|id| self.doc.kind(id) == Some(NodeKind::Comment)),
            NodeTest::Name { prefix, local } => self
                .principal_name(node, axis)
                .is_some_and(|name| name.local == *local && self.prefix_matches(prefix, name)),
            NodeTest::Wildcard { prefix } => self
                .principal_name(node, axis)
                .is_some_and(|name| self.prefix_matches(prefix, name)),
        }
    }

    /// Name of the node if it is of the axis' principal node type
    fn principal_name(&self, node: &NodeRef, axis: Axis) -> Option<&'a xbind_tree::QName> {
        match (node, axis) {
            (NodeRef::Attribute { owner, name }, Axis::Attribute) => self
                .doc
                .attributes(*owner)
                .iter()
                .find(|a| a.name.matches(name))
                .map(|a| &a.name),
            (NodeRef::Node(id), axis) if axis != Axis::Attribute => self.doc.name(*id),
            _ => None,
        }
    }

    /// A bound prefix compares namespace URIs; an unbound one compares the
    /// literal prefix. Unprefixed tests match unprefixed names.
    fn prefix_matches(&self, prefix: &Option<String>, name: &xbind_tree::QName) -> bool {
        match prefix {
            Some(p) => match self.namespaces.get(p) {
                Some(uri) => name.namespace.as_deref() == Some(uri.as_str()),
                None => name.prefix.as_deref() == Some(p.as_str()),
            },
            None => name.prefix.is_none(),
        }
    }
}
