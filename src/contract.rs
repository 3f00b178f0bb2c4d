//! Contract declarations
//!
//! A [`Contract`] is the declarative description of a projection: named
//! operations, each carrying one classification marker with its path
//! template, a return type, parameter types and the errors it may raise.
//! Contracts are plain data built with the builder methods below and bound
//! once per projector.

use std::fmt;

/// Width of an integer value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// 8-bit signed
    I8,
    /// 16-bit signed
    I16,
    /// 32-bit signed
    I32,
    /// 64-bit signed
    I64,
    /// 8-bit unsigned
    U8,
    /// 16-bit unsigned
    U16,
    /// 32-bit unsigned
    U32,
}

impl IntWidth {
    /// Inclusive value range
    pub fn range(self) -> (i64, i64) {
        match self {
            IntWidth::I8 => (i8::MIN as i64, i8::MAX as i64),
            IntWidth::I16 => (i16::MIN as i64, i16::MAX as i64),
            IntWidth::I32 => (i32::MIN as i64, i32::MAX as i64),
            IntWidth::I64 => (i64::MIN, i64::MAX),
            IntWidth::U8 => (0, u8::MAX as i64),
            IntWidth::U16 => (0, u16::MAX as i64),
            IntWidth::U32 => (0, u32::MAX as i64),
        }
    }

    fn name(self) -> &'static str {
        match self {
            IntWidth::I8 => "i8",
            IntWidth::I16 => "i16",
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
            IntWidth::U8 => "u8",
            IntWidth::U16 => "u16",
            IntWidth::U32 => "u32",
        }
    }
}

/// A closed set of named variants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    /// Type name
    pub name: String,
    /// Variant names, matched exactly
    pub variants: Vec<String>,
}

impl EnumType {
    /// Create an enumeration type
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `variant` belongs to the type
    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// Scalar types convertible to and from text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `true` / `false`
    Bool,
    /// Integer of a given width
    Int(IntWidth),
    /// Single precision float
    F32,
    /// Double precision float
    F64,
    /// One character
    Char,
    /// Text
    String,
    /// Calendar date; `None` format means ISO `%Y-%m-%d`
    Date {
        /// chrono format string
        format: Option<String>,
    },
    /// Date and time; `None` format means RFC 3339
    DateTime {
        /// chrono format string
        format: Option<String>,
    },
    /// Enumeration
    Enum(EnumType),
    /// User type handled by a registered converter of that name
    Custom(String),
}

impl ValueType {
    /// 32-bit signed integer
    pub fn int() -> Self {
        ValueType::Int(IntWidth::I32)
    }

    /// 64-bit signed integer
    pub fn long() -> Self {
        ValueType::Int(IntWidth::I64)
    }

    /// ISO date
    pub fn date() -> Self {
        ValueType::Date { format: None }
    }

    /// Date with a chrono format string
    pub fn date_with_format(format: impl Into<String>) -> Self {
        ValueType::Date {
            format: Some(format.into()),
        }
    }

    /// RFC 3339 date-time
    pub fn date_time() -> Self {
        ValueType::DateTime { format: None }
    }

    /// Date-time with a chrono format string
    pub fn date_time_with_format(format: impl Into<String>) -> Self {
        ValueType::DateTime {
            format: Some(format.into()),
        }
    }

    /// Converter registry key
    pub fn key(&self) -> String {
        match self {
            ValueType::Bool => "bool".to_string(),
            ValueType::Int(w) => w.name().to_string(),
            ValueType::F32 => "f32".to_string(),
            ValueType::F64 => "f64".to_string(),
            ValueType::Char => "char".to_string(),
            ValueType::String => "string".to_string(),
            ValueType::Date { .. } => "date".to_string(),
            ValueType::DateTime { .. } => "datetime".to_string(),
            ValueType::Enum(e) => format!("enum:{}", e.name),
            ValueType::Custom(name) => name.clone(),
        }
    }

    /// Whether this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(self, ValueType::Int(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Element type of a collection or optional
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Scalar
    Value(ValueType),
    /// Sub-projection of the named contract
    Projection(String),
    /// Raw node handle
    Node,
}

/// Declared return type of an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// Scalar
    Value(ValueType),
    /// Scalar, projection or node that may be absent
    Optional(ElementType),
    /// Collection with a declared element type
    List(ElementType),
    /// Collection without element type (rejected for reads)
    RawList,
    /// Sub-projection of the named contract
    Projection(String),
    /// Raw node handle
    Node,
    /// Live single value view
    AutoValue(ValueType),
    /// Live list view
    AutoList(ValueType),
    /// Live map view
    AutoMap(ValueType),
    /// The projection itself, for fluent setters
    This,
}

impl ReturnType {
    /// String scalar
    pub fn string() -> Self {
        ReturnType::Value(ValueType::String)
    }

    /// 32-bit integer scalar
    pub fn int() -> Self {
        ReturnType::Value(ValueType::int())
    }

    /// List of scalars
    pub fn list_of(ty: ValueType) -> Self {
        ReturnType::List(ElementType::Value(ty))
    }

    /// List of sub-projections
    pub fn projections(contract: impl Into<String>) -> Self {
        ReturnType::List(ElementType::Projection(contract.into()))
    }

    /// Whether this is one of the auto view types
    pub fn is_auto(&self) -> bool {
        matches!(
            self,
            ReturnType::AutoValue(_) | ReturnType::AutoList(_) | ReturnType::AutoMap(_)
        )
    }
}

/// Declared type of an operation parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Scalar
    Value(ValueType),
    /// Optional wrapper (rejected at binding)
    Optional(ElementType),
    /// Collection written as one element per item
    List(ElementType),
    /// Projection whose bound node is copied
    Projection(String),
    /// Node handle whose node is copied
    Node,
}

impl ParamType {
    /// String scalar parameter
    pub fn string() -> Self {
        ParamType::Value(ValueType::String)
    }

    /// 32-bit integer parameter
    pub fn int() -> Self {
        ParamType::Value(ValueType::int())
    }
}

/// One parameter of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Declared type
    pub ty: ParamType,
    /// Marks the parameter holding the value to write
    pub value: bool,
}

/// Classification markers; each carries its path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Read the nodes the path selects
    Read(String),
    /// Write to the first destination, creating it when missing
    Write(String),
    /// Change all existing destinations
    Update(String),
    /// Remove all existing destinations
    Delete(String),
    /// Return a live view over the path
    Auto(String),
    /// Load the document at this URL template before reading
    External(String),
}

/// A named, typed contract point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDecl {
    /// Operation name
    pub name: String,
    /// Classification markers
    pub markers: Vec<Marker>,
    /// Declared return type; `None` means the operation returns nothing
    pub returns: Option<ReturnType>,
    /// Parameters in call order
    pub params: Vec<ParamDecl>,
    /// Declared error names
    pub throws: Vec<String>,
}

impl OperationDecl {
    /// Start a declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
            returns: None,
            params: Vec::new(),
            throws: Vec::new(),
        }
    }

    /// Add a read marker
    pub fn read(mut self, path: impl Into<String>) -> Self {
        self.markers.push(Marker::Read(path.into()));
        self
    }

    /// Add a write marker
    pub fn write(mut self, path: impl Into<String>) -> Self {
        self.markers.push(Marker::Write(path.into()));
        self
    }

    /// Add an update marker
    pub fn update(mut self, path: impl Into<String>) -> Self {
        self.markers.push(Marker::Update(path.into()));
        self
    }

    /// Add a delete marker
    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.markers.push(Marker::Delete(path.into()));
        self
    }

    /// Add an auto-bind marker
    pub fn auto(mut self, path: impl Into<String>) -> Self {
        self.markers.push(Marker::Auto(path.into()));
        self
    }

    /// Add an external-source marker
    pub fn external(mut self, url: impl Into<String>) -> Self {
        self.markers.push(Marker::External(url.into()));
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: ReturnType) -> Self {
        self.returns = Some(ty);
        self
    }

    /// Append a parameter
    pub fn param(mut self, ty: ParamType) -> Self {
        self.params.push(ParamDecl { ty, value: false });
        self
    }

    /// Append the parameter holding the value to write
    pub fn value_param(mut self, ty: ParamType) -> Self {
        self.params.push(ParamDecl { ty, value: true });
        self
    }

    /// Declare an error raised when a read finds nothing
    pub fn throws(mut self, error: impl Into<String>) -> Self {
        self.throws.push(error.into());
        self
    }
}

/// A named group of operations a mixin can provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Capability name
    pub name: String,
    /// Operation names in the group
    pub operations: Vec<String>,
}

impl Capability {
    /// Create a capability
    pub fn new<I, S>(name: impl Into<String>, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            operations: operations.into_iter().map(Into::into).collect(),
        }
    }
}

/// A projection contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    /// Contract name
    pub name: String,
    /// Capabilities mixins may provide
    pub capabilities: Vec<Capability>,
    /// Declared operations
    pub operations: Vec<OperationDecl>,
}

impl Contract {
    /// Start a contract
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Add an operation
    pub fn operation(mut self, decl: OperationDecl) -> Self {
        self.operations.push(decl);
        self
    }

    /// Add a capability
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}
