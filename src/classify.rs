//! Operation classification and contract binding
//!
//! Each declaration is inspected once when its contract is registered. The
//! result is a [`BoundContract`]: a table from operation name to a
//! [`BoundOperation`] descriptor that the dispatcher consults on every call
//! without looking at the declaration again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::contract::{Contract, Marker, OperationDecl, ParamDecl, ParamType, ReturnType};
use crate::error::{ProjectionError, Result};

/// What a call does with its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Evaluate and materialize
    Read,
    /// Write the first destination, creating it when missing
    Write,
    /// Change every existing destination
    Update,
    /// Remove every existing destination
    Delete,
    /// Return a live view
    AutoBind,
    /// Load a document through the document source, then read
    ExternalRead,
}

impl OperationKind {
    /// Whether calls of this kind change the tree
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            OperationKind::Write | OperationKind::Update | OperationKind::Delete
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::AutoBind => "auto",
            OperationKind::ExternalRead => "external-read",
        };
        f.write_str(s)
    }
}

/// Static descriptor of a classified operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundOperation {
    /// Operation name
    pub name: String,
    /// Classification
    pub kind: OperationKind,
    /// Path template
    pub path: String,
    /// URL template of an external read
    pub source: Option<String>,
    /// Return type; `None` for operations returning nothing
    pub returns: Option<ReturnType>,
    /// Parameters
    pub params: Vec<ParamDecl>,
    /// Index of the value parameter of writes and updates
    pub value_param: Option<usize>,
    /// Error raised by a read that finds nothing
    pub not_found: Option<String>,
}

impl BoundOperation {
    /// Declared type of the value parameter
    pub fn value_type(&self) -> Option<&ParamType> {
        self.value_param.and_then(|i| self.params.get(i)).map(|p| &p.ty)
    }
}

/// A contract after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundContract {
    /// Contract name
    pub name: String,
    operations: HashMap<String, BoundOperation>,
    capability_of: HashMap<String, String>,
    capabilities: BTreeSet<String>,
}

impl BoundContract {
    /// Classify every declaration of `contract`
    pub fn bind(contract: &Contract) -> Result<Self> {
        let mut operations = HashMap::new();
        for decl in &contract.operations {
            let bound = classify(&contract.name, decl)?;
            if operations.insert(decl.name.clone(), bound).is_some() {
                return Err(invalid(&contract.name, &decl.name, "declared more than once"));
            }
        }

        let mut capability_of = HashMap::new();
        let mut capabilities = BTreeSet::new();
        for capability in &contract.capabilities {
            if !capabilities.insert(capability.name.clone()) {
                return Err(invalid(
                    &contract.name,
                    &capability.name,
                    "capability declared more than once",
                ));
            }
            for operation in &capability.operations {
                if let Some(other) = capability_of.insert(operation.clone(), capability.name.clone()) {
                    return Err(invalid(
                        &contract.name,
                        operation,
                        &format!(
                            "belongs to both capability '{}' and '{}'",
                            other, capability.name
                        ),
                    ));
                }
            }
        }

        debug!(
            contract = %contract.name,
            operations = operations.len(),
            capabilities = capabilities.len(),
            "bound contract"
        );
        Ok(Self {
            name: contract.name.clone(),
            operations,
            capability_of,
            capabilities,
        })
    }

    /// Bound operation by name
    pub fn operation(&self, name: &str) -> Option<&BoundOperation> {
        self.operations.get(name)
    }

    /// Capability an operation belongs to
    pub fn capability_of(&self, operation: &str) -> Option<&str> {
        self.capability_of.get(operation).map(String::as_str)
    }

    /// Declared capability names
    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Names of all path-backed operations
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }
}

fn invalid(contract: &str, operation: &str, reason: &str) -> ProjectionError {
    ProjectionError::Validation {
        contract: contract.to_string(),
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

/// Classify one declaration of `contract`
pub fn classify(contract: &str, decl: &OperationDecl) -> Result<BoundOperation> {
    let fail = |reason: &str| invalid(contract, &decl.name, reason);

    let mut kind_marker = None;
    let mut source = None;
    for marker in &decl.markers {
        match marker {
            Marker::External(url) => {
                if source.replace(url.clone()).is_some() {
                    return Err(fail("external source declared more than once"));
                }
            }
            _ => {
                if kind_marker.replace(marker).is_some() {
                    return Err(fail(
                        "at most one of read, write, update, delete and auto may be declared",
                    ));
                }
            }
        }
    }

    let (mut kind, path) = match kind_marker {
        Some(Marker::Read(p)) => (OperationKind::Read, p.clone()),
        Some(Marker::Write(p)) => (OperationKind::Write, p.clone()),
        Some(Marker::Update(p)) => (OperationKind::Update, p.clone()),
        Some(Marker::Delete(p)) => (OperationKind::Delete, p.clone()),
        Some(Marker::Auto(p)) => (OperationKind::AutoBind, p.clone()),
        Some(Marker::External(_)) | None if source.is_some() => {
            return Err(fail("an external source must be combined with a read"))
        }
        _ => return Err(fail("no read, write, update, delete or auto marker")),
    };

    if source.is_some() {
        if kind != OperationKind::Read {
            return Err(fail(&format!(
                "an external source cannot be combined with {}",
                kind
            )));
        }
        kind = OperationKind::ExternalRead;
    }

    if decl
        .params
        .iter()
        .any(|p| matches!(p.ty, ParamType::Optional(_)))
    {
        return Err(fail("parameters cannot be optional"));
    }

    let marked: Vec<usize> = decl
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.value)
        .map(|(i, _)| i)
        .collect();
    let writes_value = matches!(kind, OperationKind::Write | OperationKind::Update);
    if !marked.is_empty() && !writes_value {
        return Err(fail("only write and update operations take a value parameter"));
    }
    if marked.len() > 1 {
        return Err(fail("more than one value parameter"));
    }

    let mut not_found = None;
    match kind {
        OperationKind::Read | OperationKind::ExternalRead => {
            match &decl.returns {
                None => return Err(fail("read operations must declare a return type")),
                Some(ReturnType::RawList) => {
                    return Err(fail("collections must declare an element type"))
                }
                Some(ReturnType::This) => return Err(fail("only mutations can return the projection")),
                Some(r) if r.is_auto() => {
                    return Err(fail("auto view types need an auto marker"))
                }
                _ => {}
            }
            if decl.throws.len() > 1 {
                return Err(fail("read operations may declare at most one error"));
            }
            if !decl.throws.is_empty() && matches!(decl.returns, Some(ReturnType::Optional(_))) {
                return Err(fail("an optional return cannot also declare an error"));
            }
            not_found = decl.throws.first().cloned();
        }
        OperationKind::Write | OperationKind::Update => {
            if decl.params.is_empty() {
                return Err(fail(&format!("{} operations need a parameter", kind)));
            }
            if !decl.throws.is_empty() {
                return Err(fail(&format!("{} operations cannot declare errors", kind)));
            }
        }
        OperationKind::Delete => {}
        OperationKind::AutoBind => {
            if !decl.returns.as_ref().is_some_and(ReturnType::is_auto) {
                return Err(fail("auto operations must return an auto value, list or map"));
            }
        }
    }

    if kind.is_mutation() {
        if let Some(returns) = &decl.returns {
            if matches!(returns, ReturnType::RawList) || returns.is_auto() {
                return Err(fail(&format!("{} operations cannot return collections or views", kind)));
            }
        }
    }

    let value_param = if writes_value {
        Some(marked.first().copied().unwrap_or(0))
    } else {
        None
    };

    Ok(BoundOperation {
        name: decl.name.clone(),
        kind,
        path,
        source,
        returns: decl.returns.clone(),
        params: decl.params.clone(),
        value_param,
        not_found,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::{Capability, ElementType, ValueType};

    fn reason(decl: OperationDecl) -> String {
        match classify("Person", &decl).unwrap_err() {
            ProjectionError::Validation {
                contract,
                operation,
                reason,
            } => {
                assert_eq!(contract, "Person");
                assert_eq!(operation, decl.name);
                reason
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classifies_each_kind() {
        let read = classify("P", &OperationDecl::new("n").read("/a").returns(ReturnType::string()))
            .unwrap();
        assert_eq!(read.kind, OperationKind::Read);

        let write = classify("P", &OperationDecl::new("s").write("/a").param(ParamType::string()))
            .unwrap();
        assert_eq!(write.kind, OperationKind::Write);
        assert_eq!(write.value_param, Some(0));

        let update = classify(
            "P",
            &OperationDecl::new("u")
                .update("/a[@k='{0}']")
                .param(ParamType::string())
                .value_param(ParamType::string()),
        )
        .unwrap();
        assert_eq!(update.kind, OperationKind::Update);
        assert_eq!(update.value_param, Some(1));

        let delete = classify("P", &OperationDecl::new("d").delete("/a")).unwrap();
        assert_eq!(delete.kind, OperationKind::Delete);
        assert_eq!(delete.value_param, None);

        let auto = classify(
            "P",
            &OperationDecl::new("m")
                .auto("/cfg")
                .returns(ReturnType::AutoMap(ValueType::String)),
        )
        .unwrap();
        assert_eq!(auto.kind, OperationKind::AutoBind);

        let external = classify(
            "P",
            &OperationDecl::new("e")
                .read("/a")
                .external("mem://{0}")
                .param(ParamType::string())
                .returns(ReturnType::string()),
        )
        .unwrap();
        assert_eq!(external.kind, OperationKind::ExternalRead);
        assert_eq!(external.source.as_deref(), Some("mem://{0}"));
    }

    #[test]
    fn test_marker_rules() {
        assert!(reason(OperationDecl::new("x").read("/a").write("/a")).contains("at most one"));
        assert!(reason(OperationDecl::new("x")).contains("no read"));
        assert!(reason(OperationDecl::new("x").external("u")).contains("combined with a read"));
        assert!(reason(
            OperationDecl::new("x")
                .write("/a")
                .external("u")
                .param(ParamType::string())
        )
        .contains("external source"));
    }

    #[test]
    fn test_read_rules() {
        assert!(reason(OperationDecl::new("x").read("/a")).contains("return type"));
        assert!(reason(OperationDecl::new("x").read("/a").returns(ReturnType::RawList))
            .contains("element type"));
        assert!(reason(
            OperationDecl::new("x")
                .read("/a")
                .returns(ReturnType::string())
                .throws("A")
                .throws("B")
        )
        .contains("at most one error"));
        assert!(reason(
            OperationDecl::new("x")
                .read("/a")
                .returns(ReturnType::Optional(ElementType::Value(ValueType::String)))
                .throws("A")
        )
        .contains("optional"));
    }

    #[test]
    fn test_write_rules() {
        assert!(reason(OperationDecl::new("x").write("/a")).contains("need a parameter"));
        assert!(reason(
            OperationDecl::new("x")
                .update("/a")
                .param(ParamType::string())
                .throws("E")
        )
        .contains("cannot declare errors"));
        assert!(reason(
            OperationDecl::new("x")
                .write("/a")
                .value_param(ParamType::string())
                .value_param(ParamType::string())
        )
        .contains("more than one value"));
        assert!(reason(
            OperationDecl::new("x")
                .read("/a/{0}")
                .value_param(ParamType::string())
                .returns(ReturnType::string())
        )
        .contains("value parameter"));
        assert!(reason(
            OperationDecl::new("x")
                .write("/a")
                .param(ParamType::Optional(ElementType::Value(ValueType::String)))
        )
        .contains("optional"));
    }

    #[test]
    fn test_auto_rules() {
        assert!(reason(OperationDecl::new("x").auto("/a").returns(ReturnType::string()))
            .contains("auto value"));
        assert!(reason(
            OperationDecl::new("x")
                .read("/a")
                .returns(ReturnType::AutoList(ValueType::String))
        )
        .contains("auto marker"));
    }

    #[test]
    fn test_bind_contract_table() {
        let contract = Contract::new("Person")
            .capability(Capability::new("Greeter", ["greet"]))
            .operation(OperationDecl::new("name").read("/p/name").returns(ReturnType::string()))
            .operation(
                OperationDecl::new("setName")
                    .write("/p/name")
                    .param(ParamType::string())
                    .returns(ReturnType::This),
            );
        let bound = BoundContract::bind(&contract).unwrap();
        assert_eq!(bound.operation("name").unwrap().kind, OperationKind::Read);
        assert_eq!(bound.capability_of("greet"), Some("Greeter"));
        assert!(bound.operation("greet").is_none());
        assert_eq!(bound.operation_names().count(), 2);
    }

    #[test]
    fn test_bind_rejects_duplicates() {
        let contract = Contract::new("P")
            .operation(OperationDecl::new("a").read("/a").returns(ReturnType::string()))
            .operation(OperationDecl::new("a").read("/b").returns(ReturnType::string()));
        assert!(BoundContract::bind(&contract).unwrap_err().is_validation());

        let contract = Contract::new("P")
            .capability(Capability::new("X", ["op"]))
            .capability(Capability::new("Y", ["op"]));
        assert!(BoundContract::bind(&contract).unwrap_err().is_validation());
    }
}
