//! Dynamic values passed into and returned from projection calls

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use xbind_tree::{to_xml_string, NodeId};

use crate::auto::{AutoList, AutoMap, AutoValue};
use crate::document::DocumentRef;
use crate::projection::Projection;

/// A value of a user type produced by a registered converter
#[derive(Clone)]
pub struct CustomValue {
    type_name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    /// Wrap a value of type `type_name`
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    /// Converter key of the value's type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Handle to a node inside a shared document
#[derive(Clone)]
pub struct NodeHandle {
    document: DocumentRef,
    node: NodeId,
}

impl NodeHandle {
    pub(crate) fn new(document: DocumentRef, node: NodeId) -> Self {
        Self { document, node }
    }

    /// The node id
    pub fn id(&self) -> NodeId {
        self.node
    }

    /// The document holding the node
    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    /// String value of the node
    pub fn string_value(&self) -> String {
        self.document.read().string_value(self.node)
    }

    /// XML rendering of the node
    pub fn to_xml(&self) -> String {
        to_xml_string(&self.document.read(), self.node)
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.document, &other.document) && self.node == other.node
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle({})", self.node)
    }
}

/// A dynamically typed call argument or result
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absent
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Any integer width
    Int(i64),
    /// Any float width
    Float(f64),
    /// Character
    Char(char),
    /// Text
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date-time with offset
    DateTime(DateTime<FixedOffset>),
    /// Enumeration variant
    Enum {
        /// Enumeration type name
        ty: String,
        /// Variant name
        variant: String,
    },
    /// User type value
    Custom(CustomValue),
    /// Sequence
    List(Vec<Value>),
    /// Sub-projection
    Projection(Projection),
    /// Raw node
    Node(NodeHandle),
    /// Live single value view
    AutoValue(AutoValue),
    /// Live list view
    AutoList(AutoList),
    /// Live map view
    AutoMap(AutoMap),
}

impl Value {
    /// Whether the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Enum { .. } => "enum",
            Value::Custom(_) => "custom",
            Value::List(_) => "list",
            Value::Projection(_) => "projection",
            Value::Node(_) => "node",
            Value::AutoValue(_) => "auto value",
            Value::AutoList(_) => "auto list",
            Value::AutoMap(_) => "auto map",
        }
    }

    /// Borrow a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value; integers widen
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow list items
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow a projection
    pub fn as_projection(&self) -> Option<&Projection> {
        match self {
            Value::Projection(p) => Some(p),
            _ => None,
        }
    }

    /// Take the projection out
    pub fn into_projection(self) -> Option<Projection> {
        match self {
            Value::Projection(p) => Some(p),
            _ => None,
        }
    }

    /// Take list items out
    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Canonical text of a scalar, independent of any declared type
    pub(crate) fn plain_text(&self) -> Option<String> {
        Some(match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Char(c) => c.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Enum { variant, .. } => variant.clone(),
            Value::Projection(p) => p.string_value(),
            Value::Node(n) => n.string_value(),
            Value::Custom(_)
            | Value::List(_)
            | Value::AutoValue(_)
            | Value::AutoList(_)
            | Value::AutoMap(_) => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (
                Value::Enum { ty: ta, variant: va },
                Value::Enum { ty: tb, variant: vb },
            ) => ta == tb && va == vb,
            (Value::Custom(a), Value::Custom(b)) => {
                a.type_name == b.type_name && Arc::ptr_eq(&a.value, &b.value)
            }
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Projection(a), Value::Projection(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::AutoValue(a), Value::AutoValue(b)) => a == b,
            (Value::AutoList(a), Value::AutoList(b)) => a == b,
            (Value::AutoMap(a), Value::AutoMap(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Projection> for Value {
    fn from(v: Projection) -> Self {
        Value::Projection(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
