//! Projector
//!
//! The projector is the factory and registry hub: it binds contracts once,
//! creates projections over new or existing documents, and owns the
//! converter, mixin and observer registries every projection it creates
//! shares. Cloning a projector is cheap; clones share all state.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;
use xbind_path::NamespaceContext;
use xbind_tree::{Document, NodeId, QName};

use crate::auto::AutoMap;
use crate::classify::BoundContract;
use crate::config::{ProjectionFlags, ProjectorConfig};
use crate::contract::{Contract, ValueType};
use crate::convert::{ConversionContext, ConverterRegistry, ValueConverter};
use crate::document::{DocumentRef, SharedDocument};
use crate::error::{ProjectionError, Result};
use crate::externalize::{Externalizer, NoopExternalizer};
use crate::mixin::{Mixin, MixinRegistry};
use crate::observer::{ChangeObserver, ObserverRegistry};
use crate::projection::Projection;
use crate::source::DocumentSource;
use crate::value::Value;

struct ProjectorInner {
    config: ProjectorConfig,
    converters: RwLock<ConverterRegistry>,
    contracts: RwLock<HashMap<String, Arc<BoundContract>>>,
    mixins: MixinRegistry,
    observers: ObserverRegistry,
    source: RwLock<Option<Arc<dyn DocumentSource>>>,
    externalizer: RwLock<Arc<dyn Externalizer>>,
}

/// Factory for projections sharing one set of registries
#[derive(Clone)]
pub struct Projector {
    inner: Arc<ProjectorInner>,
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut contracts: Vec<String> = self.inner.contracts.read().keys().cloned().collect();
        contracts.sort();
        f.debug_struct("Projector")
            .field("config", &self.inner.config)
            .field("contracts", &contracts)
            .field("mixins", &self.inner.mixins)
            .field("observers", &self.inner.observers)
            .finish()
    }
}

impl PartialEq for Projector {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new()
    }
}

impl Projector {
    /// Projector with the default configuration
    pub fn new() -> Self {
        Self::builder().assemble(ConversionContext::default())
    }

    /// Start a builder
    pub fn builder() -> ProjectorBuilder {
        ProjectorBuilder::default()
    }

    /// Projector from a validated configuration
    pub fn from_config(config: ProjectorConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Projector from a TOML configuration file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::from_config(ProjectorConfig::from_file(path)?)
    }

    /// Configuration in effect
    pub fn config(&self) -> &ProjectorConfig {
        &self.inner.config
    }

    /// Behaviour switches in effect
    pub fn flags(&self) -> ProjectionFlags {
        self.inner.config.flags
    }

    // ── Contracts ────────────────────────────────────────────────────────

    /// Classify and cache `contract`, replacing an earlier binding of the
    /// same name
    pub fn register_contract(&self, contract: &Contract) -> Result<Arc<BoundContract>> {
        let bound = Arc::new(BoundContract::bind(contract)?);
        let replaced = self
            .inner
            .contracts
            .write()
            .insert(contract.name.clone(), Arc::clone(&bound))
            .is_some();
        debug!(contract = %contract.name, replaced, "registered contract");
        Ok(bound)
    }

    /// Bound contract by name
    pub fn contract(&self, name: &str) -> Result<Arc<BoundContract>> {
        self.inner
            .contracts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectionError::UnknownContract(name.to_string()))
    }

    // ── Projection factories ─────────────────────────────────────────────

    /// Projection over a new empty document, bound to its document node
    pub fn project_empty_document(&self, contract: &str) -> Result<Projection> {
        let document = SharedDocument::new(Document::new());
        let node = document.read().document_node();
        self.bind(document, node, contract)
    }

    /// Projection bound to a new element named `name`, detached from the
    /// document node of a new document
    pub fn project_empty_element(&self, name: &str, contract: &str) -> Result<Projection> {
        let mut qname = QName::parse(name);
        let namespace = qname
            .prefix
            .as_ref()
            .and_then(|p| self.inner.config.namespaces.get(p))
            .cloned();
        if let Some(uri) = namespace {
            qname = qname.with_namespace(uri);
        }
        let mut tree = Document::new();
        let element = tree.create_element(qname);
        self.bind(SharedDocument::new(tree), element, contract)
    }

    /// Projection over `document`, bound to its document node
    pub fn project_document(&self, document: Document, contract: &str) -> Result<Projection> {
        self.project_shared(SharedDocument::new(document), contract)
    }

    /// Projection over an already shared document, bound to its document node
    pub fn project_shared(&self, document: DocumentRef, contract: &str) -> Result<Projection> {
        let node = document.read().document_node();
        self.bind(document, node, contract)
    }

    /// Projection bound to an element (or the document node) of `document`
    pub fn project_node(&self, document: &DocumentRef, node: NodeId, contract: &str) -> Result<Projection> {
        {
            let tree = document.read();
            if !tree.contains(node) {
                return Err(ProjectionError::Tree(xbind_tree::TreeError::UnknownNode(node)));
            }
            if !tree.is_element(node) && node != tree.document_node() {
                return Err(ProjectionError::Tree(xbind_tree::TreeError::NotAnElement(node)));
            }
        }
        self.bind(Arc::clone(document), node, contract)
    }

    pub(crate) fn bind(&self, document: DocumentRef, node: NodeId, contract: &str) -> Result<Projection> {
        let contract = self.contract(contract)?;
        Ok(Projection::new(self.clone(), document, node, contract))
    }

    /// Live map over a new empty document, keys resolved from its root
    pub fn auto_map_empty_document(&self, value_type: ValueType) -> AutoMap {
        let document = SharedDocument::new(Document::new());
        let node = document.read().document_node();
        AutoMap::new(self.clone(), document, node, "/".to_string(), value_type)
    }

    /// XML rendering of a projection's bound node
    pub fn as_string(&self, value: &Value) -> Result<String> {
        match value {
            Value::Projection(p) => Ok(p.to_xml()),
            other => Err(ProjectionError::NotAProjection(format!(
                "cannot render a {} as a document",
                other.kind_name()
            ))),
        }
    }

    // ── Registries ───────────────────────────────────────────────────────

    /// Register `mixin` for the contract named `contract`
    pub fn add_mixin(&self, contract: &str, mixin: Arc<dyn Mixin>) -> Result<Vec<String>> {
        let bound = self.contract(contract)?;
        self.inner.mixins.add(&bound, mixin)
    }

    /// Mixin serving `capability` of `contract`
    pub fn get_mixin(&self, contract: &str, capability: &str) -> Option<Arc<dyn Mixin>> {
        self.inner.mixins.get(contract, capability)
    }

    /// Unregister the mixin serving `capability` of `contract`
    pub fn remove_mixin(&self, contract: &str, capability: &str) -> Option<Arc<dyn Mixin>> {
        self.inner.mixins.remove(contract, capability)
    }

    /// Register an observer for mutations made through this projector; it
    /// is held weakly. Use [`SharedDocument::add_change_observer`] to follow
    /// one document regardless of projector.
    pub fn add_change_observer(&self, observer: &Arc<dyn ChangeObserver>) {
        self.inner.observers.add(observer);
    }

    /// Resolve declared path and URL templates through `externalizer`
    pub fn set_externalizer(&self, externalizer: Arc<dyn Externalizer>) {
        *self.inner.externalizer.write() = externalizer;
    }

    /// Register a converter for the type key `key`
    pub fn register_converter(&self, key: impl Into<String>, converter: Arc<dyn ValueConverter>) {
        self.inner.converters.write().register(key, converter);
    }

    /// Set the source used by external reads
    pub fn set_document_source(&self, source: Arc<dyn DocumentSource>) {
        *self.inner.source.write() = Some(source);
    }

    pub(crate) fn converters(&self) -> RwLockReadGuard<'_, ConverterRegistry> {
        self.inner.converters.read()
    }

    pub(crate) fn document_source(&self) -> Option<Arc<dyn DocumentSource>> {
        self.inner.source.read().clone()
    }

    pub(crate) fn externalizer(&self) -> Arc<dyn Externalizer> {
        self.inner.externalizer.read().clone()
    }

    /// Tell the document's observers, then this projector's, that
    /// `document` changed
    pub(crate) fn notify_changed(&self, document: &SharedDocument) {
        document.notify_changed();
        self.inner.observers.notify();
    }

    /// Document declarations overlaid with the configured bindings
    pub(crate) fn namespaces(&self, document: &Document) -> NamespaceContext {
        let mut namespaces = document.namespace_mapping();
        namespaces.extend(
            self.inner
                .config
                .namespaces
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        namespaces
    }
}

/// Programmatic projector configuration
#[derive(Default)]
pub struct ProjectorBuilder {
    config: ProjectorConfig,
    converters: Vec<(String, Arc<dyn ValueConverter>)>,
    source: Option<Arc<dyn DocumentSource>>,
    externalizer: Option<Arc<dyn Externalizer>>,
}

impl ProjectorBuilder {
    /// Replace the whole configuration
    pub fn config(mut self, config: ProjectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Locale tag selecting the decimal separator
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Offset for date-times read without one
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.config.time_zone = time_zone.into();
        self
    }

    /// Bind `prefix` to `uri` for name tests
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.config.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Serialize every call per document
    pub fn synchronize_on_documents(mut self, enabled: bool) -> Self {
        self.config.flags.synchronize_on_documents = enabled;
        self
    }

    /// Render projections as XML in `Display`
    pub fn to_string_renders_xml(mut self, enabled: bool) -> Self {
        self.config.flags.to_string_renders_xml = enabled;
        self
    }

    /// Skip blank nodes in list reads
    pub fn omit_empty_nodes(mut self, enabled: bool) -> Self {
        self.config.flags.omit_empty_nodes = enabled;
        self
    }

    /// Absent scalar reads yield the type's empty value
    pub fn absent_is_empty(mut self, enabled: bool) -> Self {
        self.config.flags.absent_is_empty = enabled;
        self
    }

    /// Register a converter for the type key `key`
    pub fn converter(mut self, key: impl Into<String>, converter: Arc<dyn ValueConverter>) -> Self {
        self.converters.push((key.into(), converter));
        self
    }

    /// Source used by external reads
    pub fn document_source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Validate the configuration and build the projector
    pub fn build(self) -> Result<Projector> {
        self.config.validate()?;
        let context = ConversionContext {
            decimal_separator: self.config.decimal_separator(),
            time_zone: self.config.time_zone_offset()?,
        };
        debug!(
            locale = %self.config.locale,
            time_zone = %self.config.time_zone,
            flags = ?self.config.flags,
            "building projector"
        );
        Ok(self.assemble(context))
    }

    /// Externalizer consulted for every declared path and URL template
    pub fn externalizer(mut self, externalizer: Arc<dyn Externalizer>) -> Self {
        self.externalizer = Some(externalizer);
        self
    }

    fn assemble(self, context: ConversionContext) -> Projector {
        let mut registry = ConverterRegistry::new(context);
        for (key, converter) in self.converters {
            registry.register(key, converter);
        }
        let externalizer = self
            .externalizer
            .unwrap_or_else(|| Arc::new(NoopExternalizer));
        Projector {
            inner: Arc::new(ProjectorInner {
                config: self.config,
                converters: RwLock::new(registry),
                contracts: RwLock::new(HashMap::new()),
                mixins: MixinRegistry::new(),
                observers: ObserverRegistry::new(),
                source: RwLock::new(self.source),
                externalizer: RwLock::new(externalizer),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contract::{OperationDecl, ReturnType};

    fn person() -> Contract {
        Contract::new("Person").operation(OperationDecl::new("name").read("/person/name").returns(ReturnType::string()))
    }

    #[test]
    fn test_unknown_contract() {
        let projector = Projector::new();
        let err = projector.project_empty_document("Person").unwrap_err();
        assert!(matches!(err, ProjectionError::UnknownContract(name) if name == "Person"));
    }

    #[test]
    fn test_register_replaces_binding() {
        let projector = Projector::new();
        let first = projector.register_contract(&person()).unwrap();
        let second = projector.register_contract(&person()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&projector.contract("Person").unwrap(), &second));
    }

    #[test]
    fn test_builder_validates() {
        assert!(Projector::builder().time_zone("Mars/Olympus").build().is_err());
        let projector = Projector::builder()
            .locale("de-DE")
            .time_zone("+02:00")
            .absent_is_empty(true)
            .build()
            .unwrap();
        assert!(projector.flags().absent_is_empty);
        assert_eq!(projector.converters().context().decimal_separator, ',');
        assert_eq!(projector.converters().context().time_zone.local_minus_utc(), 7200);
    }

    #[test]
    fn test_empty_element_is_detached() {
        let projector = Projector::new();
        projector.register_contract(&person()).unwrap();
        let projection = projector.project_empty_element("person", "Person").unwrap();
        let doc = projection.document().read();
        assert!(!doc.is_attached(projection.node_id()));
        assert!(doc.document_element().is_none());
    }

    #[test]
    fn test_as_string_requires_projection() {
        let projector = Projector::new();
        let err = projector.as_string(&Value::from("x")).unwrap_err();
        assert!(matches!(err, ProjectionError::NotAProjection(_)));
    }

    #[test]
    fn test_namespaces_overlay_document() {
        let projector = Projector::builder().namespace("a", "urn:config").build().unwrap();
        let mut doc = Document::with_root("root");
        let root = doc.document_element().unwrap();
        doc.set_attribute(root, "xmlns:a", "urn:doc").unwrap();
        doc.set_attribute(root, "xmlns:b", "urn:b").unwrap();
        let ns = projector.namespaces(&doc);
        assert_eq!(ns.get("a").map(String::as_str), Some("urn:config"));
        assert_eq!(ns.get("b").map(String::as_str), Some("urn:b"));
    }
}
