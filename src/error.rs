//! Error types for xbind
//!
//! Every fallible projection operation returns [`ProjectionError`]. Path
//! and tree errors from the member crates convert into the matching
//! variants, so `?` works across the whole stack.

use thiserror::Error;
use xbind_path::PathError;
use xbind_tree::TreeError;

/// Main error type for projection operations
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// An operation declaration broke a classification rule
    #[error("Invalid operation '{operation}' in contract '{contract}': {reason}")]
    Validation {
        /// Contract name
        contract: String,
        /// Operation name
        operation: String,
        /// Broken rule
        reason: String,
    },

    /// A resolved path could not be parsed
    #[error("Path syntax error: {0}")]
    PathSyntax(String),

    /// A write path contains a step that cannot be synthesized
    #[error("Path not writable: {0}")]
    NonWritablePath(String),

    /// A read found nothing and the operation declares an error for that case
    #[error("No node found for '{operation}' (raises {error})")]
    NotFound {
        /// Operation name
        operation: String,
        /// Declared error name
        error: String,
    },

    /// Text could not be converted to the declared type or back
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A value handed to a projection-only API is not a projection
    #[error("Not a projection: {0}")]
    NotAProjection(String),

    /// No contract of that name is registered with the projector
    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    /// The contract does not declare the operation
    #[error("Unknown operation '{operation}' on contract '{contract}'")]
    UnknownOperation {
        /// Contract name
        contract: String,
        /// Operation name
        operation: String,
    },

    /// A capability operation was called without a mixin providing it
    #[error("No mixin provides capability '{capability}' of contract '{contract}' for '{operation}'")]
    MissingCapability {
        /// Contract name
        contract: String,
        /// Capability name
        capability: String,
        /// Operation name
        operation: String,
    },

    /// Argument count does not match the declaration
    #[error("Operation '{operation}' expects {expected} argument(s), got {actual}")]
    InvalidArguments {
        /// Operation name
        operation: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Loading an external document failed
    #[error("External source error: {0}")]
    ExternalSource(String),

    /// Configuration parsing or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tree mutation failed
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Result type alias for projection operations
pub type Result<T> = std::result::Result<T, ProjectionError>;

impl From<PathError> for ProjectionError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Syntax { .. } => ProjectionError::PathSyntax(err.to_string()),
            PathError::NotWritable { .. } => ProjectionError::NonWritablePath(err.to_string()),
            PathError::Type(msg) => ProjectionError::Conversion(msg),
            PathError::Tree(e) => ProjectionError::Tree(e),
        }
    }
}

impl ProjectionError {
    /// Returns true for errors raised while binding a contract
    pub fn is_validation(&self) -> bool {
        matches!(self, ProjectionError::Validation { .. })
    }

    /// Returns true if the error comes from a path expression
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            ProjectionError::PathSyntax(_) | ProjectionError::NonWritablePath(_)
        )
    }

    /// Returns true for the declared not-found signal of a read
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProjectionError::NotFound { .. })
    }

    /// The declared error name carried by a not-found error
    pub fn declared_error(&self) -> Option<&str> {
        match self {
            ProjectionError::NotFound { error, .. } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        ProjectionError::Conversion(message.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_path_errors_convert() {
        let syntax = xbind_path::CompiledPath::compile("/a[").unwrap_err();
        let err: ProjectionError = syntax.into();
        assert!(matches!(err, ProjectionError::PathSyntax(_)));
        assert!(err.is_path_error());

        let not_writable = xbind_path::analyze(&xbind_path::CompiledPath::compile("/a/b[1]").unwrap())
            .unwrap_err();
        let err: ProjectionError = not_writable.into();
        assert!(matches!(err, ProjectionError::NonWritablePath(_)));
    }

    #[test]
    fn test_not_found_helpers() {
        let err = ProjectionError::NotFound {
            operation: "name".into(),
            error: "MissingName".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.declared_error(), Some("MissingName"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_message() {
        let err = ProjectionError::Validation {
            contract: "Person".into(),
            operation: "setName".into(),
            reason: "write operations need a parameter".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid operation 'setName' in contract 'Person': write operations need a parameter"
        );
    }
}
