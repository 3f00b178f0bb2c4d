//! Externalized path and URL templates
//!
//! An [`Externalizer`] sees the template declared on an operation before
//! placeholders are filled in and may swap it for another one, for example
//! a path kept in a resource table under the declared value as key. The
//! projector uses [`NoopExternalizer`] unless one is configured.

use std::collections::HashMap;

use crate::classify::BoundOperation;
use crate::error::Result;
use crate::value::Value;

/// Resolves declared templates into the templates actually used
pub trait Externalizer: Send + Sync {
    /// Path template for `operation` of `contract`; `declared` is the
    /// template from the declaration
    fn resolve_path(
        &self,
        contract: &str,
        operation: &BoundOperation,
        declared: &str,
        args: &[Value],
    ) -> Result<String> {
        let _ = (contract, operation, args);
        Ok(declared.to_string())
    }

    /// URL template of an external read
    fn resolve_url(
        &self,
        contract: &str,
        operation: &BoundOperation,
        declared: &str,
        args: &[Value],
    ) -> Result<String> {
        let _ = (contract, operation, args);
        Ok(declared.to_string())
    }
}

/// Uses declared templates as they are
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExternalizer;

impl Externalizer for NoopExternalizer {}

/// Looks declared templates up as keys of a table; unknown keys pass
/// through unchanged
#[derive(Debug, Default, Clone)]
pub struct TableExternalizer {
    paths: HashMap<String, String>,
    urls: HashMap<String, String>,
}

impl TableExternalizer {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the declared path `key` to `path`
    pub fn path(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.paths.insert(key.into(), path.into());
        self
    }

    /// Map the declared URL `key` to `url`
    pub fn url(mut self, key: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(key.into(), url.into());
        self
    }
}

impl Externalizer for TableExternalizer {
    fn resolve_path(&self, _: &str, _: &BoundOperation, declared: &str, _: &[Value]) -> Result<String> {
        Ok(self.paths.get(declared).cloned().unwrap_or_else(|| declared.to_string()))
    }

    fn resolve_url(&self, _: &str, _: &BoundOperation, declared: &str, _: &[Value]) -> Result<String> {
        Ok(self.urls.get(declared).cloned().unwrap_or_else(|| declared.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::contract::{OperationDecl, ReturnType};

    fn op() -> BoundOperation {
        classify("T", &OperationDecl::new("name").read("name.path").returns(ReturnType::string())).unwrap()
    }

    #[test]
    fn test_noop_keeps_templates() {
        let op = op();
        assert_eq!(NoopExternalizer.resolve_path("T", &op, "/a/{0}", &[]).unwrap(), "/a/{0}");
        assert_eq!(NoopExternalizer.resolve_url("T", &op, "mem://x", &[]).unwrap(), "mem://x");
    }

    #[test]
    fn test_table_lookup() {
        let op = op();
        let table = TableExternalizer::new().path("name.path", "/person/name").url("home", "mem://home");
        assert_eq!(table.resolve_path("T", &op, "name.path", &[]).unwrap(), "/person/name");
        assert_eq!(table.resolve_path("T", &op, "/other", &[]).unwrap(), "/other");
        assert_eq!(table.resolve_url("T", &op, "home", &[]).unwrap(), "mem://home");
    }
}
