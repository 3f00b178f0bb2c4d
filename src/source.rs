//! External document sources
//!
//! Operations carrying an external marker load their document through a
//! [`DocumentSource`] instead of reading the bound projection's tree.

use std::collections::HashMap;

use parking_lot::RwLock;
use xbind_tree::Document;

use crate::error::{ProjectionError, Result};

/// Loads documents by URL
pub trait DocumentSource: Send + Sync {
    /// Load the document at `url`
    fn load(&self, url: &str) -> Result<Document>;
}

/// Source serving documents registered in memory
#[derive(Debug, Default)]
pub struct InMemorySource {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` at `url`
    pub fn insert(&self, url: impl Into<String>, document: Document) {
        self.documents.write().insert(url.into(), document);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(self, url: impl Into<String>, document: Document) -> Self {
        self.insert(url, document);
        self
    }
}

impl DocumentSource for InMemorySource {
    fn load(&self, url: &str) -> Result<Document> {
        self.documents
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| ProjectionError::ExternalSource(format!("no document at '{}'", url)))
    }
}
