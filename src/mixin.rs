//! Mixins
//!
//! A mixin implements one or more capabilities of a contract directly, in
//! code, instead of through path templates. The registry indexes a mixin
//! under every capability it shares with the contract; the dispatcher
//! consults it before any path handling.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::classify::BoundContract;
use crate::error::{ProjectionError, Result};
use crate::projection::Projection;
use crate::value::Value;

/// Code-backed implementation of contract capabilities
pub trait Mixin: Send + Sync {
    /// Names of the capabilities this mixin provides
    fn capabilities(&self) -> Vec<String>;

    /// Handle `operation` on `projection`
    fn invoke(&self, projection: &Projection, operation: &str, args: &[Value]) -> Result<Value>;
}

type CapabilityTable = HashMap<String, Arc<dyn Mixin>>;

/// Contract name to capability name to mixin
#[derive(Default)]
pub struct MixinRegistry {
    mixins: RwLock<HashMap<String, CapabilityTable>>,
}

impl std::fmt::Debug for MixinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mixins = self.mixins.read();
        let mut entries: Vec<(&String, Vec<&String>)> = mixins
            .iter()
            .map(|(contract, table)| {
                let mut caps: Vec<&String> = table.keys().collect();
                caps.sort();
                (contract, caps)
            })
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

impl MixinRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mixin` for `contract`; returns the capabilities it now serves
    pub fn add(&self, contract: &BoundContract, mixin: Arc<dyn Mixin>) -> Result<Vec<String>> {
        let mut served: Vec<String> = mixin
            .capabilities()
            .into_iter()
            .filter(|c| contract.capabilities().contains(c))
            .collect();
        served.sort();
        served.dedup();
        if served.is_empty() {
            return Err(ProjectionError::Validation {
                contract: contract.name.clone(),
                operation: String::new(),
                reason: "mixin provides none of the contract's capabilities".to_string(),
            });
        }

        let mut mixins = self.mixins.write();
        let table = mixins.entry(contract.name.clone()).or_default();
        for capability in &served {
            if table.insert(capability.clone(), Arc::clone(&mixin)).is_some() {
                warn!(
                    contract = %contract.name,
                    capability = %capability,
                    "mixin replaced an earlier registration"
                );
            }
        }
        trace!(contract = %contract.name, capabilities = ?served, "registered mixin");
        Ok(served)
    }

    /// Mixin serving `capability` of `contract`
    pub fn get(&self, contract: &str, capability: &str) -> Option<Arc<dyn Mixin>> {
        self.mixins
            .read()
            .get(contract)
            .and_then(|table| table.get(capability))
            .cloned()
    }

    /// Unregister the mixin serving `capability` of `contract`
    pub fn remove(&self, contract: &str, capability: &str) -> Option<Arc<dyn Mixin>> {
        let mut mixins = self.mixins.write();
        let table = mixins.get_mut(contract)?;
        let removed = table.remove(capability);
        if table.is_empty() {
            mixins.remove(contract);
        }
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::{Capability, Contract};

    struct Named(&'static [&'static str]);

    impl Mixin for Named {
        fn capabilities(&self) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }

        fn invoke(&self, _: &Projection, operation: &str, _: &[Value]) -> Result<Value> {
            Ok(Value::from(operation))
        }
    }

    fn contract() -> BoundContract {
        BoundContract::bind(
            &Contract::new("Person")
                .capability(Capability::new("Greeting", ["greet"]))
                .capability(Capability::new("Audit", ["audit"])),
        )
        .unwrap()
    }

    #[test]
    fn test_indexes_by_intersection() {
        let registry = MixinRegistry::new();
        let served = registry
            .add(&contract(), Arc::new(Named(&["Greeting", "Unrelated"])))
            .unwrap();
        assert_eq!(served, vec!["Greeting".to_string()]);
        assert!(registry.get("Person", "Greeting").is_some());
        assert!(registry.get("Person", "Unrelated").is_none());
        assert!(registry.get("Person", "Audit").is_none());
    }

    #[test]
    fn test_empty_intersection_is_rejected() {
        let registry = MixinRegistry::new();
        let err = registry.add(&contract(), Arc::new(Named(&["Other"]))).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_remove() {
        let registry = MixinRegistry::new();
        registry.add(&contract(), Arc::new(Named(&["Greeting", "Audit"]))).unwrap();
        assert!(registry.remove("Person", "Greeting").is_some());
        assert!(registry.get("Person", "Greeting").is_none());
        assert!(registry.get("Person", "Audit").is_some());
        assert!(registry.remove("Person", "Greeting").is_none());
    }
}
