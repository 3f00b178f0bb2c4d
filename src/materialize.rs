//! Type materialization
//!
//! Reads: evaluation results become values of the declared return shape.
//! Writes: call arguments become text or detached fragments the dispatcher
//! can apply to the tree.

use xbind_path::{format_number, node_string_value, XPathValue};
use xbind_tree::{Document, Fragment, NodeKind, NodeRef};

use crate::classify::BoundOperation;
use crate::contract::{ElementType, ParamType, ReturnType, ValueType};
use crate::convert::ConverterRegistry;
use crate::document::DocumentRef;
use crate::error::{ProjectionError, Result};
use crate::projector::Projector;
use crate::value::{NodeHandle, Value};

/// Converts evaluation results against one document
pub(crate) struct Materializer<'a> {
    pub(crate) projector: &'a Projector,
    pub(crate) document: &'a DocumentRef,
    pub(crate) tree: &'a Document,
    pub(crate) converters: &'a ConverterRegistry,
}

impl Materializer<'_> {
    /// Materialize the result of a read operation
    pub(crate) fn read(&self, result: XPathValue, op: &BoundOperation) -> Result<Value> {
        let Some(returns) = &op.returns else {
            return Ok(Value::Null);
        };
        match returns {
            ReturnType::List(element) => self.list(result, element),
            ReturnType::Optional(element) => match self.first(&result) {
                None => Ok(Value::Null),
                Some(first) => match element {
                    ElementType::Value(ty) => match self.scalar(&first, ty)? {
                        Some(value) => Ok(value),
                        None => Ok(Value::Null),
                    },
                    _ => self.item(&first, element),
                },
            },
            ReturnType::Value(ty) => match self.first(&result) {
                Some(first) => match self.scalar(&first, ty)? {
                    Some(value) => Ok(value),
                    None => self.absent(op, Some(ty)),
                },
                None => self.absent(op, Some(ty)),
            },
            ReturnType::Projection(contract) => match self.first(&result) {
                Some(first) => self.item(&first, &ElementType::Projection(contract.clone())),
                None => self.absent(op, None),
            },
            ReturnType::Node => match self.first(&result) {
                Some(first) => self.item(&first, &ElementType::Node),
                None => self.absent(op, None),
            },
            other => Err(ProjectionError::conversion(format!(
                "'{}' cannot be read as {:?}",
                op.name, other
            ))),
        }
    }

    fn list(&self, result: XPathValue, element: &ElementType) -> Result<Value> {
        let nodes = match result {
            XPathValue::NodeSet(nodes) => nodes,
            scalar => {
                return Ok(Value::List(vec![self.item(&Selected::Scalar(scalar), element)?]));
            }
        };
        let omit_empty = self.projector.flags().omit_empty_nodes;
        let mut items = Vec::with_capacity(nodes.len());
        for node in nodes {
            if omit_empty && is_blank(self.tree, &node) {
                continue;
            }
            items.push(self.item(&Selected::Node(node), element)?);
        }
        Ok(Value::List(items))
    }

    fn first(&self, result: &XPathValue) -> Option<Selected> {
        match result {
            XPathValue::NodeSet(nodes) => nodes.first().cloned().map(Selected::Node),
            scalar => Some(Selected::Scalar(scalar.clone())),
        }
    }

    /// Convert a selected node or scalar; `None` when its text is blank and
    /// the type is not a string
    fn scalar(&self, selected: &Selected, ty: &ValueType) -> Result<Option<Value>> {
        let text = selected.text(self.tree);
        if *ty != ValueType::String && text.trim().is_empty() {
            return Ok(None);
        }
        self.converters.to_value(&text, ty).map(Some)
    }

    fn item(&self, selected: &Selected, element: &ElementType) -> Result<Value> {
        match element {
            ElementType::Value(ty) => {
                let text = selected.text(self.tree);
                self.converters.to_value(&text, ty)
            }
            ElementType::Projection(contract) => {
                let node = self.bindable(selected, "projected")?;
                Ok(Value::Projection(self.projector.bind(self.document.clone(), node, contract)?))
            }
            ElementType::Node => {
                let node = self.bindable(selected, "returned as a node")?;
                Ok(Value::Node(NodeHandle::new(self.document.clone(), node)))
            }
        }
    }

    fn bindable(&self, selected: &Selected, what: &str) -> Result<xbind_tree::NodeId> {
        match selected {
            Selected::Node(NodeRef::Node(id))
                if matches!(
                    self.tree.kind(*id),
                    Some(NodeKind::Element | NodeKind::Document)
                ) =>
            {
                Ok(*id)
            }
            Selected::Node(NodeRef::Attribute { name, .. }) => Err(ProjectionError::conversion(
                format!("attribute '{}' cannot be {}", name, what),
            )),
            Selected::Node(_) => Err(ProjectionError::conversion(format!(
                "only elements can be {}",
                what
            ))),
            Selected::Scalar(value) => Err(ProjectionError::conversion(format!(
                "a {} cannot be {}",
                value.type_name(),
                what
            ))),
        }
    }

    fn absent(&self, op: &BoundOperation, ty: Option<&ValueType>) -> Result<Value> {
        if let Some(ty) = ty {
            if self.projector.flags().absent_is_empty {
                return Ok(empty_value(ty));
            }
        }
        match &op.not_found {
            Some(error) => Err(ProjectionError::NotFound {
                operation: op.name.clone(),
                error: error.clone(),
            }),
            None => Ok(Value::Null),
        }
    }
}

/// One selected node or a scalar evaluation result
#[derive(Debug, Clone)]
enum Selected {
    Node(NodeRef),
    Scalar(XPathValue),
}

impl Selected {
    fn text(&self, tree: &Document) -> String {
        match self {
            Selected::Node(node) => node_string_value(tree, node),
            Selected::Scalar(XPathValue::Number(n)) => format_number(*n),
            Selected::Scalar(value) => value.to_string_value(tree),
        }
    }
}

/// The value an absent scalar reads as when absent values are empty
pub(crate) fn empty_value(ty: &ValueType) -> Value {
    match ty {
        ValueType::String => Value::String(String::new()),
        ValueType::Int(_) => Value::Int(0),
        ValueType::F32 | ValueType::F64 => Value::Float(0.0),
        ValueType::Bool => Value::Bool(false),
        ValueType::Char => Value::Char('\0'),
        _ => Value::Null,
    }
}

/// Blank text and, for elements, no attributes and no child elements
pub(crate) fn is_blank(tree: &Document, node: &NodeRef) -> bool {
    if !node_string_value(tree, node).trim().is_empty() {
        return false;
    }
    match node {
        NodeRef::Node(id) if tree.is_element(*id) => {
            tree.attributes(*id).is_empty() && tree.element_children(*id).next().is_none()
        }
        _ => true,
    }
}

// ── Render side ──────────────────────────────────────────────────────────

/// Argument prepared for a mutation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    /// Remove the destination
    Remove,
    /// Replace the destination's text
    Text(String),
    /// Replace the destination's attributes and children
    Fragment(Fragment),
    /// One new element per item
    Items(Vec<Item>),
}

/// Content of one list item
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Fragment(Fragment),
}

/// Prepare `value`, declared as `ty`, for writing
pub(crate) fn prepare_payload(
    converters: &ConverterRegistry,
    value: &Value,
    ty: &ParamType,
) -> Result<Payload> {
    if value.is_null() {
        return Ok(Payload::Remove);
    }
    match ty {
        ParamType::Value(ty) => Ok(Payload::Text(converters.to_text(value, ty)?)),
        ParamType::Projection(_) | ParamType::Node => Ok(Payload::Fragment(capture(value)?)),
        ParamType::List(element) => {
            let items = match value {
                Value::List(items) => items,
                other => {
                    return Err(ProjectionError::conversion(format!(
                        "expected a list, got a {}",
                        other.kind_name()
                    )))
                }
            };
            items
                .iter()
                .map(|item| match element {
                    ElementType::Value(ty) => converters.to_text(item, ty).map(Item::Text),
                    ElementType::Projection(_) | ElementType::Node => capture(item).map(Item::Fragment),
                })
                .collect::<Result<Vec<_>>>()
                .map(Payload::Items)
        }
        ParamType::Optional(_) => Err(ProjectionError::conversion(
            "optional parameters cannot be written",
        )),
    }
}

/// Render an argument for a path placeholder
pub(crate) fn render_argument(
    converters: &ConverterRegistry,
    value: &Value,
    ty: &ParamType,
) -> Result<String> {
    match ty {
        ParamType::Value(ty) => converters.to_text(value, ty),
        _ => value.plain_text().ok_or_else(|| {
            ProjectionError::conversion(format!(
                "a {} cannot be used in a path",
                value.kind_name()
            ))
        }),
    }
}

/// Detached copy of the node a projection or node handle is bound to
fn capture(value: &Value) -> Result<Fragment> {
    let (document, node) = match value {
        Value::Projection(p) => (p.document(), p.node_id()),
        Value::Node(handle) => (handle.document(), handle.id()),
        other => {
            return Err(ProjectionError::conversion(format!(
                "expected a projection or node, got a {}",
                other.kind_name()
            )))
        }
    };
    let tree = document.read();
    Ok(tree.fragment(node)?)
}

/// Concatenated text of a fragment
pub(crate) fn fragment_text(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Element { children, .. } => children.iter().map(fragment_text).collect(),
        Fragment::Text(t) => t.clone(),
        Fragment::Comment(_) => String::new(),
    }
}
