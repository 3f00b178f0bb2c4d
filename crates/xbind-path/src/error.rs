//! Path compilation and evaluation errors

use thiserror::Error;
use xbind_tree::TreeError;

/// Errors raised while compiling, evaluating or writing through a path
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathError {
    /// The expression could not be parsed
    #[error("path syntax error in '{expression}' at offset {position}: {message}")]
    Syntax {
        /// Expression text
        expression: String,
        /// Byte offset of the failure
        position: usize,
        /// What went wrong
        message: String,
    },

    /// The expression is valid for reading but cannot direct a write
    #[error("path '{expression}' is not writable at step '{step}': {reason}")]
    NotWritable {
        /// Expression text
        expression: String,
        /// Offending step as written
        step: String,
        /// Why the step cannot be synthesized
        reason: String,
    },

    /// An operand had the wrong type (e.g. union of non-node-sets)
    #[error("path type error: {0}")]
    Type(String),

    /// Tree mutation failed while creating nodes
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl PathError {
    /// Returns true if the error stems from the expression text itself
    pub fn is_syntax(&self) -> bool {
        matches!(self, PathError::Syntax { .. })
    }

    /// Returns true if the path was rejected for writing
    pub fn is_not_writable(&self) -> bool {
        matches!(self, PathError::NotWritable { .. })
    }
}

/// Result alias for path operations
pub type Result<T> = std::result::Result<T, PathError>;
