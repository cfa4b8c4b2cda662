//! In-memory shared log store.

use std::sync::Arc;

use dashmap::DashMap;

use super::SharedLog;
use crate::error::Result;

/// A document store held in process memory.
///
/// Clones share the same documents, which lets several limiters in one process
/// behave like separate processes attached to one external store.
#[derive(Debug, Clone, Default)]
pub struct MemorySharedLog {
    documents: Arc<DashMap<String, String>>,
}

impl MemorySharedLog {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a document, as an external store evicting it would.
    pub fn evict(&self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl SharedLog for MemorySharedLog {
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.documents.contains_key(id))
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.documents.get(id).map(|doc| doc.value().clone()))
    }

    fn set(&self, id: &str, document: &str) -> Result<()> {
        self.documents.insert(id.to_string(), document.to_string());
        Ok(())
    }
}
