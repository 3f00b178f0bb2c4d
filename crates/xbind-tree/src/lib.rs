#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! # xbind-tree
//!
//! Mutable, ordered, attributed tree documents for xbind projections.
//!
//! Nodes live in a per-document arena and are addressed by [`NodeId`]
//! handles. The crate offers what the projection engine needs from a DOM:
//! document-order child and attribute access, creation and removal of
//! elements, text and attributes, string values, fragment copies across
//! documents, structural equality and hashing, and XML rendering.

pub mod document;
pub mod equality;
pub mod error;
pub mod node;
pub mod render;

pub use document::{Document, Fragment};
pub use equality::{node_hash, nodes_equal};
pub use error::TreeError;
pub use node::{Attribute, NodeId, NodeKind, NodeRef, QName};
pub use render::to_xml_string;
