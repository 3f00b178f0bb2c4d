#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! # xbind-path
//!
//! Path expressions over xbind-tree documents: an XPath 1.0 subset with
//! the core function library, compiled once and evaluated many times, plus
//! the write-direction analysis that lets a path both read and create the
//! nodes it names.
//!
//! ```
//! use xbind_path::{evaluate, CompiledPath, XPathValue};
//! use xbind_tree::{Document, NodeRef};
//!
//! let mut doc = Document::with_root("a");
//! let root = doc.document_element().unwrap();
//! doc.set_attribute(root, "n", "3").unwrap();
//!
//! let path = CompiledPath::compile("/a/@n * 2").unwrap();
//! let value = evaluate(&path, &doc, &NodeRef::Node(doc.document_node())).unwrap();
//! assert_eq!(value, XPathValue::Number(6.0));
//! ```

pub mod ast;
pub mod duplex;
pub mod error;
pub mod evaluator;
mod functions;
pub mod parser;
pub mod value;

pub use ast::{Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};
pub use duplex::{
    analyze, resolve_existing, resolve_for_write, Condition, WritePath, WriteStep, WriteTarget,
};
pub use error::PathError;
pub use evaluator::{evaluate, evaluate_with_namespaces, select_nodes, NamespaceContext};
pub use functions::arity;
pub use parser::{parse, CompiledPath};
pub use value::{format_number, node_string_value, parse_number, XPathValue};
