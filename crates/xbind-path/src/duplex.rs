//! Write-direction path analysis
//!
//! A path is *writable* when every step can be synthesized: child element
//! steps, a trailing attribute step and `.`, with predicates limited to
//! equality tests between an attribute, a child element or `.` and a
//! literal. Resolving such a path for writing walks it from a context
//! element, reusing the first existing match of each step and creating
//! missing elements so that the created element satisfies the step's
//! predicates.

use tracing::trace;
use xbind_tree::{Document, NodeId, NodeKind, NodeRef, QName};

use crate::ast::{Axis, BinaryOp, Expr, NodeTest, Step};
use crate::error::{PathError, Result};
use crate::evaluator::{evaluate_with_namespaces, NamespaceContext};
use crate::parser::CompiledPath;
use crate::value::{format_number, XPathValue};

/// A path reduced to synthesizable steps
#[derive(Debug, Clone, PartialEq)]
pub struct WritePath {
    source: String,
    absolute: bool,
    steps: Vec<WriteStep>,
}

/// One synthesizable step
#[derive(Debug, Clone, PartialEq)]
pub enum WriteStep {
    /// `.`
    Current,
    /// Child element with predicate conditions
    Element {
        /// Qualified element name
        name: String,
        /// Conditions the element must satisfy
        conditions: Vec<Condition>,
    },
    /// Trailing `@name`
    Attribute {
        /// Qualified attribute name
        name: String,
    },
}

/// Equality condition from a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `[@name='value']`
    Attribute {
        /// Attribute name
        name: String,
        /// Required value
        value: String,
    },
    /// `[name='value']`
    Child {
        /// Child element name
        name: String,
        /// Required string value
        value: String,
    },
    /// `[.='value']`
    Text(String),
}

/// Node a write lands on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Element (or the document node for `/`-rooted self steps)
    Element(NodeId),
    /// Attribute of an element
    Attribute {
        /// Owning element
        owner: NodeId,
        /// Qualified attribute name
        name: String,
    },
}

impl From<WriteTarget> for NodeRef {
    fn from(target: WriteTarget) -> Self {
        match target {
            WriteTarget::Element(id) => NodeRef::Node(id),
            WriteTarget::Attribute { owner, name } => NodeRef::Attribute { owner, name },
        }
    }
}

/// Decide whether `path` is writable and extract its steps
pub fn analyze(path: &CompiledPath) -> Result<WritePath> {
    let not_writable = |step: &str, reason: &str| PathError::NotWritable {
        expression: path.source().to_string(),
        step: step.to_string(),
        reason: reason.to_string(),
    };

    let location = path
        .expr()
        .as_location_path()
        .ok_or_else(|| not_writable(path.source(), "only location paths can be written"))?;
    if location.steps.is_empty() {
        return Err(not_writable("/", "the document node cannot be written"));
    }

    let last = location.steps.len() - 1;
    let mut steps = Vec::with_capacity(location.steps.len());
    for (i, step) in location.steps.iter().enumerate() {
        let text = step.to_string();
        let write_step = match (step.axis, &step.test) {
            (Axis::Child, NodeTest::Name { .. }) => WriteStep::Element {
                name: step.test.qualified_name().unwrap_or_default(),
                conditions: step_conditions(step).map_err(|reason| not_writable(&text, &reason))?,
            },
            (Axis::Attribute, NodeTest::Name { .. }) => {
                if i != last {
                    return Err(not_writable(&text, "an attribute step must be the last step"));
                }
                if !step.predicates.is_empty() {
                    return Err(not_writable(&text, "attribute steps cannot carry predicates"));
                }
                WriteStep::Attribute {
                    name: step.test.qualified_name().unwrap_or_default(),
                }
            }
            (Axis::SelfAxis, NodeTest::Node) if step.predicates.is_empty() => WriteStep::Current,
            (Axis::Child | Axis::Attribute, NodeTest::Wildcard { .. }) => {
                return Err(not_writable(&text, "wildcards do not name a node to create"))
            }
            (Axis::Child, _) => {
                return Err(not_writable(&text, "only named elements can be created"))
            }
            _ => {
                return Err(not_writable(
                    &text,
                    "only child, attribute and self steps can be synthesized",
                ))
            }
        };
        steps.push(write_step);
    }

    Ok(WritePath {
        source: path.source().to_string(),
        absolute: location.absolute,
        steps,
    })
}

fn step_conditions(step: &Step) -> std::result::Result<Vec<Condition>, String> {
    let mut conditions = Vec::new();
    for predicate in &step.predicates {
        collect_conditions(predicate, &mut conditions)?;
    }
    Ok(conditions)
}

fn collect_conditions(expr: &Expr, out: &mut Vec<Condition>) -> std::result::Result<(), String> {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            collect_conditions(left, out)?;
            collect_conditions(right, out)
        }
        Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } => {
            let (step, value) = match (literal_text(right), literal_text(left)) {
                (Some(value), _) => (single_step(left), value),
                (None, Some(value)) => (single_step(right), value),
                (None, None) => {
                    return Err("equality predicates need a literal operand".to_string())
                }
            };
            let step = step.ok_or("equality predicates must test a single relative step")?;
            let condition = match (step.axis, &step.test) {
                (Axis::Attribute, NodeTest::Name { .. }) => Condition::Attribute {
                    name: step.test.qualified_name().unwrap_or_default(),
                    value,
                },
                (Axis::Child, NodeTest::Name { .. }) => Condition::Child {
                    name: step.test.qualified_name().unwrap_or_default(),
                    value,
                },
                (Axis::SelfAxis, NodeTest::Node) => Condition::Text(value),
                _ => return Err(format!("cannot synthesize a node for '{}'", step)),
            };
            out.push(condition);
            Ok(())
        }
        Expr::Number(_) => Err("positional predicates cannot be synthesized".to_string()),
        _ => Err(format!("predicate '{}' cannot be synthesized", expr)),
    }
}

fn literal_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(s) => Some(s.clone()),
        Expr::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

fn single_step(expr: &Expr) -> Option<&Step> {
    let path = expr.as_location_path()?;
    match path.steps.as_slice() {
        [step] if !path.absolute && step.predicates.is_empty() => Some(step),
        _ => None,
    }
}

impl WritePath {
    /// Original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the path starts at the tree root
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Synthesizable steps in order
    pub fn steps(&self) -> &[WriteStep] {
        &self.steps
    }

    /// The path without its last step, and the last step
    pub fn split_last(&self) -> Option<(WritePath, &WriteStep)> {
        let (last, rest) = self.steps.split_last()?;
        Some((
            WritePath {
                source: self.source.clone(),
                absolute: self.absolute,
                steps: rest.to_vec(),
            },
            last,
        ))
    }

    /// Walk the path from `context`. Existing nodes are reused, first match
    /// in document order. Missing nodes are created when `create_missing` is
    /// set; otherwise a missing node yields `Ok(None)`.
    pub fn resolve(
        &self,
        doc: &mut Document,
        context: NodeId,
        create_missing: bool,
        namespaces: &NamespaceContext,
    ) -> Result<Option<WriteTarget>> {
        let mut current = if self.absolute {
            doc.tree_root(context)
        } else {
            context
        };
        for step in &self.steps {
            match step {
                WriteStep::Current => {}
                WriteStep::Attribute { name } => {
                    if !doc.is_element(current) {
                        return Err(self.not_writable(step, "attributes need an element owner"));
                    }
                    if doc.attribute(current, name).is_none() {
                        if !create_missing {
                            return Ok(None);
                        }
                        doc.set_attribute(current, qualified(name, namespaces), "")?;
                    }
                    return Ok(Some(WriteTarget::Attribute {
                        owner: current,
                        name: name.clone(),
                    }));
                }
                WriteStep::Element { .. } => {
                    current = match step.find(doc, current, namespaces) {
                        Some(existing) => existing,
                        None if !create_missing => return Ok(None),
                        None => self.create(step, doc, current, namespaces)?,
                    };
                }
            }
        }
        Ok(Some(WriteTarget::Element(current)))
    }

    /// Append a new element satisfying `step` to `parent`
    pub fn create(
        &self,
        step: &WriteStep,
        doc: &mut Document,
        parent: NodeId,
        namespaces: &NamespaceContext,
    ) -> Result<NodeId> {
        let WriteStep::Element { name, conditions } = step else {
            return Err(self.not_writable(step, "only element steps create elements"));
        };
        match doc.kind(parent) {
            Some(NodeKind::Document) => {
                if let Some(existing) = doc.document_element() {
                    let reason = format!(
                        "the document element is already '{}'",
                        doc.name(existing).map(QName::qualified).unwrap_or_default()
                    );
                    return Err(self.not_writable(step, &reason));
                }
            }
            Some(NodeKind::Element) => {}
            _ => return Err(self.not_writable(step, "elements need an element or document parent")),
        }

        trace!(element = %name, path = %self.source, "creating element for write");
        let element = doc.create_element(qualified(name, namespaces));
        doc.append_child(parent, element)?;
        for condition in conditions {
            match condition {
                Condition::Attribute { name, value } => {
                    doc.set_attribute(element, qualified(name, namespaces), value.as_str())?;
                }
                Condition::Child { name, value } => {
                    let child = doc.create_element(qualified(name, namespaces));
                    doc.set_text_content(child, value)?;
                    doc.append_child(element, child)?;
                }
                Condition::Text(value) => doc.set_text_content(element, value)?,
            }
        }
        Ok(element)
    }

    fn not_writable(&self, step: &WriteStep, reason: &str) -> PathError {
        PathError::NotWritable {
            expression: self.source.clone(),
            step: step.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl WriteStep {
    /// First child of `parent` matching this step
    pub fn find(&self, doc: &Document, parent: NodeId, namespaces: &NamespaceContext) -> Option<NodeId> {
        doc.element_children(parent)
            .find(|child| self.matches(doc, *child, namespaces))
    }

    /// Whether `node` is an element this step selects
    pub fn matches(&self, doc: &Document, node: NodeId, namespaces: &NamespaceContext) -> bool {
        let WriteStep::Element { name, conditions } = self else {
            return false;
        };
        doc.name(node)
            .is_some_and(|n| name_matches(n, name, namespaces))
            && conditions.iter().all(|c| match c {
                Condition::Attribute { name, value } => {
                    doc.attribute(node, name) == Some(value.as_str())
                }
                Condition::Child { name, value } => doc.element_children(node).any(|child| {
                    doc.name(child).is_some_and(|n| name_matches(n, name, namespaces))
                        && doc.string_value(child) == *value
                }),
                Condition::Text(value) => doc.string_value(node) == *value,
            })
    }
}

impl std::fmt::Display for WriteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteStep::Current => write!(f, "."),
            WriteStep::Attribute { name } => write!(f, "@{}", name),
            WriteStep::Element { name, conditions } => {
                write!(f, "{}", name)?;
                for c in conditions {
                    match c {
                        Condition::Attribute { name, value } => write!(f, "[@{}='{}']", name, value)?,
                        Condition::Child { name, value } => write!(f, "[{}='{}']", name, value)?,
                        Condition::Text(value) => write!(f, "[.='{}']", value)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Element name test mirroring the evaluator's rules
fn name_matches(node: &QName, name: &str, namespaces: &NamespaceContext) -> bool {
    let wanted = QName::parse(name);
    if node.local != wanted.local {
        return false;
    }
    match &wanted.prefix {
        Some(prefix) => match namespaces.get(prefix) {
            Some(uri) => node.namespace.as_deref() == Some(uri.as_str()),
            None => node.prefix.as_deref() == Some(prefix.as_str()),
        },
        None => node.prefix.is_none(),
    }
}

fn qualified(name: &str, namespaces: &NamespaceContext) -> QName {
    let qname = QName::parse(name);
    match qname.prefix.as_ref().and_then(|p| namespaces.get(p)) {
        Some(uri) => qname.with_namespace(uri.as_str()),
        None => qname,
    }
}

/// Compile-and-resolve shortcut
pub fn resolve_for_write(
    path: &CompiledPath,
    doc: &mut Document,
    context: NodeId,
    create_missing: bool,
    namespaces: &NamespaceContext,
) -> Result<Option<WriteTarget>> {
    analyze(path)?.resolve(doc, context, create_missing, namespaces)
}

/// All existing nodes `path` selects, for update and delete. Scalar results
/// cannot be written.
pub fn resolve_existing(
    path: &CompiledPath,
    doc: &Document,
    context: &NodeRef,
    namespaces: &NamespaceContext,
) -> Result<Vec<NodeRef>> {
    match evaluate_with_namespaces(path, doc, context, namespaces)? {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        other => Err(PathError::NotWritable {
            expression: path.source().to_string(),
            step: path.source().to_string(),
            reason: format!("the expression yields a {}, not nodes", other.type_name()),
        }),
    }
}
