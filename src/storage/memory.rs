//! In-memory document store

use dashmap::DashMap;
use serde_json::Value;

use crate::Result;

use super::{validate_key, StubStore};

/// Document store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: DashMap<String, Value>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl StubStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        Ok(self.documents.get(key).map(|doc| doc.value().clone()))
    }

    fn save(&self, key: &str, document: &Value) -> Result<()> {
        validate_key(key)?;
        self.documents.insert(key.to_string(), document.clone());
        Ok(())
    }
}
