#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # xbind
//!
//! Typed projections over mutable tree documents. A contract declares
//! operations and attaches a path template to each; a projection binds the
//! contract to one node and turns calls into path evaluations on read and
//! tree mutations on write.
//!
//! This is the top-level crate. It re-exports the workspace crates so one
//! dependency covers the whole stack; each member crate can also be used on
//! its own.
//!
//! ## Crate Organization
//!
//! | Crate | Description |
//! |-------|-------------|
//! | [`xbind-tree`](xbind_tree) | Arena tree document, structural equality, XML rendering |
//! | [`xbind-path`](xbind_path) | Path parser, evaluator, function library, write analysis |
//!
//! ## Example
//!
//! ```
//! use xbind::{Contract, OperationDecl, ParamType, Projector, ReturnType, Value};
//!
//! let projector = Projector::new();
//! projector
//!     .register_contract(
//!         &Contract::new("Person")
//!             .operation(OperationDecl::new("name").read("/person/name").returns(ReturnType::string()))
//!             .operation(OperationDecl::new("set_name").write("/person/name").param(ParamType::string())),
//!     )
//!     .unwrap();
//!
//! let person = projector.project_empty_document("Person").unwrap();
//! person.set("set_name", "Ada").unwrap();
//! assert_eq!(person.get("name").unwrap(), Value::from("Ada"));
//! assert_eq!(person.to_xml(), "<person><name>Ada</name></person>");
//! ```

pub mod auto;
pub mod classify;
pub mod config;
pub mod contract;
pub mod convert;
mod dispatch;
pub mod document;
pub mod error;
pub mod externalize;
mod materialize;
pub mod mixin;
pub mod observer;
pub mod projection;
pub mod projector;
pub mod source;
pub mod value;

// ── Re-exports from member crates ────────────────────────────────────────────

pub use xbind_path as path;
pub use xbind_tree as tree;

pub use xbind_path::{CompiledPath, NamespaceContext, XPathValue};
pub use xbind_tree::{Document, NodeId, NodeRef, QName};

// ── Projection API ───────────────────────────────────────────────────────────

pub use auto::{AutoList, AutoMap, AutoValue};
pub use classify::{classify, BoundContract, BoundOperation, OperationKind};
pub use config::{ProjectionFlags, ProjectorConfig};
pub use contract::{
    Capability, Contract, ElementType, EnumType, IntWidth, Marker, OperationDecl, ParamDecl,
    ParamType, ReturnType, ValueType,
};
pub use convert::{ConversionContext, ConverterRegistry, DefaultConverter, FromStrConverter, ValueConverter};
pub use document::{DocumentRef, SharedDocument};
pub use error::{ProjectionError, Result};
pub use externalize::{Externalizer, NoopExternalizer, TableExternalizer};
pub use mixin::{Mixin, MixinRegistry};
pub use observer::{ChangeObserver, ObserverRegistry};
pub use projection::Projection;
pub use projector::{Projector, ProjectorBuilder};
pub use source::{DocumentSource, InMemorySource};
pub use value::{CustomValue, NodeHandle, Value};
